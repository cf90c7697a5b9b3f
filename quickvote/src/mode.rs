//! Classification of an election into one of its five phases.

use std::fmt::Display;

use snafu::prelude::*;

use crate::error::*;
use crate::model::Election;

/// Where an election stands, as far as the administrator is concerned.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Phase {
    /// Not opened yet.
    Begin,
    /// Voting is open for the current stage.
    Stage,
    /// Voting is closed and the tally awaits adjudication.
    StagePartial,
    /// Between two stages.
    Inbetween,
    /// A quick poll is open, before the first stage or between two stages.
    InbetweenQuickpoll,
}

impl Phase {
    /// True when ballots are being collected and a live count is meaningful.
    pub fn collects_ballots(&self) -> bool {
        matches!(self, Phase::Stage | Phase::InbetweenQuickpoll)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Begin => "Begin",
            Phase::Stage => "Stage",
            Phase::StagePartial => "StagePartial",
            Phase::Inbetween => "Inbetween",
            Phase::InbetweenQuickpoll => "InbetweenQuickpoll",
        };
        write!(f, "{}", s)
    }
}

/// The typed reading of the numeric stage index.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum StagePosition {
    /// -1
    NotStarted,
    /// `n`: stage `n` is voting or awaiting adjudication.
    Voting(usize),
    /// `n + 0.5`: stage `n` has concluded.
    Between(usize),
}

impl StagePosition {
    pub fn from_index(stage_index: f64) -> EngineResult<StagePosition> {
        if stage_index == -1.0 {
            return Ok(StagePosition::NotStarted);
        }
        ensure!(
            stage_index >= 0.0 && stage_index.is_finite(),
            MalformedElectionStateSnafu {
                detail: format!("stage index {} is neither -1 nor positive", stage_index)
            }
        );
        let whole = stage_index.trunc();
        let fract = stage_index - whole;
        if fract == 0.0 {
            Ok(StagePosition::Voting(whole as usize))
        } else if fract == 0.5 {
            Ok(StagePosition::Between(whole as usize))
        } else {
            MalformedElectionStateSnafu {
                detail: format!("stage index {} is not a whole or half number", stage_index),
            }
            .fail()
        }
    }

    pub fn to_index(&self) -> f64 {
        match self {
            StagePosition::NotStarted => -1.0,
            StagePosition::Voting(n) => *n as f64,
            StagePosition::Between(n) => *n as f64 + 0.5,
        }
    }
}

/// Classifies an election.
///
/// Total over well-formed elections. Combinations that the server should never
/// produce are reported as [EngineError::MalformedElectionState].
pub fn classify(election: &Election) -> EngineResult<Phase> {
    let position = election.position()?;
    let quick_poll = election.active_quick_poll().is_some();
    let partial = election.partial_tally.is_some();
    let num_stages = election.stages.len();

    match position {
        StagePosition::NotStarted => {
            ensure!(
                !partial,
                MalformedElectionStateSnafu {
                    detail: "partial tally present before the first stage"
                }
            );
            if quick_poll {
                Ok(Phase::InbetweenQuickpoll)
            } else {
                Ok(Phase::Begin)
            }
        }
        StagePosition::Voting(n) => {
            ensure!(
                n < num_stages,
                MalformedElectionStateSnafu {
                    detail: format!("stage {} is open but only {} stages exist", n, num_stages)
                }
            );
            ensure!(
                !quick_poll,
                MalformedElectionStateSnafu {
                    detail: format!("quick poll active while stage {} is open", n)
                }
            );
            if partial {
                Ok(Phase::StagePartial)
            } else {
                Ok(Phase::Stage)
            }
        }
        StagePosition::Between(n) => {
            ensure!(
                n < num_stages,
                MalformedElectionStateSnafu {
                    detail: format!("stage {} concluded but only {} stages exist", n, num_stages)
                }
            );
            ensure!(
                !partial,
                MalformedElectionStateSnafu {
                    detail: format!("partial tally present between stages {} and {}", n, n + 1)
                }
            );
            if quick_poll {
                Ok(Phase::InbetweenQuickpoll)
            } else {
                Ok(Phase::Inbetween)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElectionBuilder;
    use crate::model::*;

    fn election(stage_index: f64) -> Election {
        ElectionBuilder::new("Assembly")
            .stage(Stage::new("First", CandidateSource::inline(&["A", "B"])))
            .stage(Stage::new("Second", CandidateSource::Alternates))
            .stage(Stage::new("Third", CandidateSource::YesNo))
            .stage_index(stage_index)
            .build()
    }

    fn tally() -> Vec<TallyEntry> {
        vec![TallyEntry {
            name: "A".to_string(),
            vote_count: 3,
            vote_percentage: "100%".to_string(),
            decision: None,
            rationale: String::new(),
        }]
    }

    #[test]
    fn not_started() {
        assert_eq!(classify(&election(-1.0)).unwrap(), Phase::Begin);
        let mut e = election(-1.0);
        e.active_quick_poll_prompt = Some("Coffee?".to_string());
        assert_eq!(classify(&e).unwrap(), Phase::InbetweenQuickpoll);
    }

    #[test]
    fn voting() {
        assert_eq!(classify(&election(2.0)).unwrap(), Phase::Stage);
        let mut e = election(2.0);
        e.partial_tally = Some(tally());
        assert_eq!(classify(&e).unwrap(), Phase::StagePartial);
    }

    #[test]
    fn between_stages() {
        assert_eq!(classify(&election(1.5)).unwrap(), Phase::Inbetween);
        let mut e = election(1.5);
        e.active_quick_poll_prompt = Some("Break now?".to_string());
        assert_eq!(classify(&e).unwrap(), Phase::InbetweenQuickpoll);
    }

    #[test]
    fn deterministic() {
        let mut e = election(0.5);
        e.active_quick_poll_prompt = Some("Lunch?".to_string());
        assert_eq!(classify(&e).unwrap(), classify(&e).unwrap());
    }

    #[test]
    fn malformed_combinations() {
        let mut e = election(1.5);
        e.partial_tally = Some(tally());
        assert!(matches!(
            classify(&e),
            Err(EngineError::MalformedElectionState { .. })
        ));

        let mut e = election(1.0);
        e.active_quick_poll_prompt = Some("?".to_string());
        assert!(matches!(
            classify(&e),
            Err(EngineError::MalformedElectionState { .. })
        ));

        let mut e = election(-1.0);
        e.partial_tally = Some(tally());
        assert!(classify(&e).is_err());

        for bad in [1.25, -0.5, -2.0, 3.0, 7.5, f64::NAN] {
            assert!(
                matches!(
                    classify(&election(bad)),
                    Err(EngineError::MalformedElectionState { .. })
                ),
                "{} should be malformed",
                bad
            );
        }
    }
}
