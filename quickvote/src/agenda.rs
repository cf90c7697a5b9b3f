//! Editing the list of stages of an election.
//!
//! Stages that already ran are frozen. The functions here work on a copy of
//! the election; nothing reaches the server until the result is saved.

use log::debug;
use snafu::prelude::*;

use crate::error::*;
use crate::mode::StagePosition;
use crate::model::*;

pub const NEW_STAGE_TITLE: &str = "Choose your candidate";
pub const NEW_STAGE_CANDIDATES: [&str; 3] = ["CandidateA", "CandidateB", "CandidateC"];

/// True if the stage at `index` may still be edited.
pub fn is_stage_editable(election: &Election, index: usize) -> bool {
    index as f64 >= election.stage_index
}

// Index of the first stage that can be removed or moved.
fn first_movable(election: &Election) -> EngineResult<usize> {
    match election.position()? {
        StagePosition::NotStarted => Ok(0),
        StagePosition::Voting(n) | StagePosition::Between(n) => Ok(n + 1),
    }
}

/// Appends a stage with the default settings.
pub fn add_stage(election: &Election) -> Election {
    let mut res = election.clone();
    res.stages.push(Stage::new(
        NEW_STAGE_TITLE,
        CandidateSource::inline(&NEW_STAGE_CANDIDATES),
    ));
    res
}

pub fn remove_stage(election: &Election, index: usize) -> EngineResult<Election> {
    ensure!(
        index < election.stages.len(),
        ValidationFailedSnafu {
            reason: ValidationReason::NoSuchStage
        }
    );
    ensure!(
        index >= first_movable(election)?,
        ValidationFailedSnafu {
            reason: ValidationReason::StageLocked
        }
    );
    let mut res = election.clone();
    let removed = res.stages.remove(index);
    debug!("remove_stage: {} {:?}", index, removed.title);
    Ok(res)
}

/// Moves the stage at `from` so that it ends up at position `to`.
///
/// A future stage can not be moved before a completed or active stage.
pub fn move_stage(election: &Election, from: usize, to: usize) -> EngineResult<Election> {
    let num_stages = election.stages.len();
    ensure!(
        from < num_stages && to < num_stages,
        ValidationFailedSnafu {
            reason: ValidationReason::NoSuchStage
        }
    );
    let first = first_movable(election)?;
    ensure!(
        from >= first && to >= first,
        ValidationFailedSnafu {
            reason: ValidationReason::StageLocked
        }
    );
    let mut res = election.clone();
    let stage = res.stages.remove(from);
    res.stages.insert(to, stage);
    Ok(res)
}

/// Applies `edit` to the stage at `index`.
pub fn edit_stage<F>(election: &Election, index: usize, edit: F) -> EngineResult<Election>
where
    F: FnOnce(&Stage) -> EngineResult<Stage>,
{
    let stage = election.stages.get(index).context(ValidationFailedSnafu {
        reason: ValidationReason::NoSuchStage,
    })?;
    ensure!(
        is_stage_editable(election, index),
        ValidationFailedSnafu {
            reason: ValidationReason::StageLocked
        }
    );
    let edited = edit(stage)?;
    let mut res = election.clone();
    res.stages[index] = edited;
    Ok(res)
}

/// Restricts the voters of a stage to one value of a voter attribute.
///
/// Without a `value`, the first value the server offers for the column is
/// used. Without a `column`, the restriction is removed.
pub fn set_voter_filter(
    election: &Election,
    index: usize,
    column: Option<&str>,
    value: Option<&str>,
) -> EngineResult<Election> {
    let filter = match column {
        None => None,
        Some(column) => {
            let values = election
                .filter_values(column)
                .context(ValidationFailedSnafu {
                    reason: ValidationReason::UnknownFilter,
                })?;
            let picked = match value {
                Some(v) => values.iter().find(|fv| fv.value == v),
                None => values.first(),
            }
            .context(ValidationFailedSnafu {
                reason: ValidationReason::UnknownFilter,
            })?;
            Some(VoterFilter {
                attribute: column.to_string(),
                value: picked.value.clone(),
            })
        }
    };
    edit_stage(election, index, |s| {
        let mut res = s.clone();
        res.voter_filter = filter;
        Ok(res)
    })
}

/// Checks that `edited` leaves the locked stages of `current` untouched.
///
/// The stage being voted on may be edited in place, but it can not be
/// removed or swapped with a later stage.
pub fn check_locked_stages(current: &Election, edited: &Election) -> EngineResult<()> {
    let locked = current
        .stages
        .iter()
        .enumerate()
        .filter(|(i, _)| !is_stage_editable(current, *i));
    for (i, stage) in locked {
        ensure!(
            edited.stages.get(i) == Some(stage),
            ValidationFailedSnafu {
                reason: ValidationReason::StageLocked
            }
        );
    }
    let first = first_movable(current)?;
    if first > 0 {
        ensure!(
            keeps_stage_in_place(current, edited, first - 1),
            ValidationFailedSnafu {
                reason: ValidationReason::StageLocked
            }
        );
    }
    Ok(())
}

fn keeps_stage_in_place(current: &Election, edited: &Election, n: usize) -> bool {
    match (current.stages.get(n), edited.stages.get(n)) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(before), Some(after)) if before == after => true,
        (Some(before), Some(after)) => {
            !current.stages[n + 1..].contains(after) && !edited.stages[n + 1..].contains(before)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElectionBuilder;
    use crate::source::{set_source_kind, set_winner_quota};

    fn agenda(stage_index: f64) -> Election {
        ElectionBuilder::new("Assembly")
            .stage(Stage::new("Chair", CandidateSource::inline(&["A", "B"])))
            .stage(Stage::new("Treasurer", CandidateSource::Alternates))
            .stage(Stage::new("Budget", CandidateSource::YesNo))
            .stage_index(stage_index)
            .build()
    }

    fn titles(e: &Election) -> Vec<&str> {
        e.stages.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn editable_from_current_stage_on() {
        let e = agenda(1.0);
        assert!(!is_stage_editable(&e, 0));
        assert!(is_stage_editable(&e, 1));
        assert!(is_stage_editable(&e, 2));
        let e = agenda(1.5);
        assert!(!is_stage_editable(&e, 1));
    }

    #[test]
    fn new_stage_defaults() {
        let e = add_stage(&agenda(-1.0));
        let s = e.stages.last().unwrap();
        assert_eq!(s.title, "Choose your candidate");
        assert_eq!(s.policy, "Manual");
        assert_eq!(s.winner_quota, 1);
        assert!(!s.exact_winner_count);
        assert_eq!(
            s.candidate_source,
            CandidateSource::inline(&["CandidateA", "CandidateB", "CandidateC"])
        );
    }

    #[test]
    fn remove_only_future_stages() {
        let e = agenda(0.5);
        assert_eq!(
            remove_stage(&e, 0).unwrap_err().validation_reason(),
            Some(ValidationReason::StageLocked)
        );
        assert_eq!(titles(&remove_stage(&e, 1).unwrap()), vec!["Chair", "Budget"]);
        assert_eq!(
            remove_stage(&e, 3).unwrap_err().validation_reason(),
            Some(ValidationReason::NoSuchStage)
        );
    }

    #[test]
    fn move_never_crosses_current_stage() {
        let e = agenda(0.0);
        assert_eq!(
            titles(&move_stage(&e, 2, 1).unwrap()),
            vec!["Chair", "Budget", "Treasurer"]
        );
        assert_eq!(
            move_stage(&e, 2, 0).unwrap_err().validation_reason(),
            Some(ValidationReason::StageLocked)
        );
        assert_eq!(
            move_stage(&e, 1, 5).unwrap_err().validation_reason(),
            Some(ValidationReason::NoSuchStage)
        );
        // Before the election opens every stage can move.
        assert_eq!(
            titles(&move_stage(&agenda(-1.0), 2, 0).unwrap()),
            vec!["Budget", "Chair", "Treasurer"]
        );
    }

    #[test]
    fn edit_applies_stage_helpers() {
        let e = agenda(0.0);
        let e = edit_stage(&e, 1, |s| set_winner_quota(s, 2)).unwrap();
        assert_eq!(e.stages[1].winner_quota, 2);
        let e = edit_stage(&e, 1, |s| Ok(set_source_kind(s, CandidateSource::YesNo))).unwrap();
        assert_eq!(e.stages[1].winner_quota, 1);
        assert_eq!(
            edit_stage(&e, 2, |s| set_winner_quota(s, 3))
                .unwrap_err()
                .validation_reason(),
            Some(ValidationReason::InvalidQuotaForBinarySource)
        );
        let e = agenda(1.5);
        assert_eq!(
            edit_stage(&e, 0, |s| Ok(s.clone()))
                .unwrap_err()
                .validation_reason(),
            Some(ValidationReason::StageLocked)
        );
    }

    #[test]
    fn locked_stages_must_be_unchanged() {
        let current = agenda(1.0);
        let mut edited = current.clone();
        edited.stages[2].title = "Approve the budget?".to_string();
        assert!(check_locked_stages(&current, &edited).is_ok());
        edited.stages[0].title = "President".to_string();
        assert_eq!(
            check_locked_stages(&current, &edited)
                .unwrap_err()
                .validation_reason(),
            Some(ValidationReason::StageLocked)
        );
        let truncated = ElectionBuilder::new("Assembly").stage_index(1.0).build();
        assert!(check_locked_stages(&current, &truncated).is_err());
    }

    #[test]
    fn voter_filter_comes_from_the_offered_values() {
        let mut e = agenda(-1.0);
        e.filter_metadata = ElectionBuilder::new("x")
            .filter_column("Precinct", &[("12", 40), ("14", 3)])
            .build()
            .filter_metadata;

        let e = set_voter_filter(&e, 1, Some("Precinct"), None).unwrap();
        assert_eq!(
            e.stages[1].voter_filter,
            Some(VoterFilter {
                attribute: "Precinct".to_string(),
                value: "12".to_string()
            })
        );
        let e = set_voter_filter(&e, 1, Some("Precinct"), Some("14")).unwrap();
        assert_eq!(e.stages[1].voter_filter.as_ref().unwrap().value, "14");
        for (column, value) in [("Precinct", Some("99")), ("Role", None)] {
            assert_eq!(
                set_voter_filter(&e, 1, Some(column), value)
                    .unwrap_err()
                    .validation_reason(),
                Some(ValidationReason::UnknownFilter)
            );
        }
        let e = set_voter_filter(&e, 1, None, None).unwrap();
        assert_eq!(e.stages[1].voter_filter, None);
    }

    #[test]
    fn voting_stage_stays_in_place() {
        let current = agenda(1.0);
        let edited = edit_stage(&current, 1, |s| set_winner_quota(s, 2)).unwrap();
        assert!(check_locked_stages(&current, &edited).is_ok());

        let mut removed = current.clone();
        removed.stages.remove(1);
        let mut swapped = current.clone();
        swapped.stages.swap(1, 2);
        let mut truncated = current.clone();
        truncated.stages.truncate(1);
        for edited in [removed, swapped, truncated] {
            assert_eq!(
                check_locked_stages(&current, &edited)
                    .unwrap_err()
                    .validation_reason(),
                Some(ValidationReason::StageLocked)
            );
        }

        // Between stages the next one is still free to move.
        let current = agenda(0.5);
        let mut swapped = current.clone();
        swapped.stages.swap(1, 2);
        assert!(check_locked_stages(&current, &swapped).is_ok());
    }
}
