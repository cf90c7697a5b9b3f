pub use crate::model::*;

/// A builder for assembling an election by hand.
///
/// Elections normally come from the server. The builder is handy for seeding
/// the simulated server and for tests.
///
/// ```
/// use quickvote::builder::ElectionBuilder;
/// use quickvote::{classify, CandidateSource, Phase, Stage};
///
/// let election = ElectionBuilder::new("Annual meeting")
///     .stage(Stage::new("Chair", CandidateSource::inline(&["Anna", "Bob"])))
///     .stage(Stage::new("Approve the budget?", CandidateSource::YesNo))
///     .build();
///
/// assert_eq!(classify(&election)?, Phase::Begin);
/// # Ok::<(), quickvote::EngineError>(())
/// ```
pub struct ElectionBuilder {
    election: Election,
}

impl ElectionBuilder {
    pub fn new(title: &str) -> ElectionBuilder {
        ElectionBuilder {
            election: Election {
                title: title.to_string(),
                target_date: None,
                stages: Vec::new(),
                stage_index: -1.0,
                round_id: RoundId::default(),
                active_quick_poll_prompt: None,
                partial_tally: None,
                completed: false,
                stage_outcomes: Vec::new(),
                error_message: None,
                policy_details: Vec::new(),
                filter_metadata: None,
                report_metadata: None,
                credential_metadata: None,
            },
        }
    }

    pub fn target_date(mut self, date: &str) -> ElectionBuilder {
        self.election.target_date = Some(date.to_string());
        self
    }

    pub fn stage(mut self, stage: Stage) -> ElectionBuilder {
        self.election.stages.push(stage);
        self
    }

    pub fn stage_index(mut self, stage_index: f64) -> ElectionBuilder {
        self.election.stage_index = stage_index;
        self
    }

    pub fn round(mut self, round_id: RoundId) -> ElectionBuilder {
        self.election.round_id = round_id;
        self
    }

    pub fn quick_poll(mut self, prompt: &str) -> ElectionBuilder {
        self.election.active_quick_poll_prompt = Some(prompt.to_string());
        self
    }

    /// Sets a partial tally. The entries are expected in decreasing vote order.
    pub fn partial_tally(mut self, entries: &[(&str, u64)]) -> ElectionBuilder {
        let total: u64 = entries.iter().map(|(_, c)| *c).sum();
        let tally = entries
            .iter()
            .map(|(name, count)| TallyEntry {
                name: name.to_string(),
                vote_count: *count,
                vote_percentage: format_percentage(*count, total),
                decision: None,
                rationale: String::new(),
            })
            .collect();
        self.election.partial_tally = Some(tally);
        self
    }

    pub fn policy(mut self, key: &str, description: &str) -> ElectionBuilder {
        self.election.policy_details.push(PolicyDescription {
            key: key.to_string(),
            description: description.to_string(),
        });
        self
    }

    /// Declares the values voters may be filtered on for `column`.
    pub fn filter_column(mut self, column: &str, values: &[(&str, u64)]) -> ElectionBuilder {
        let values = values
            .iter()
            .map(|(value, count_hint)| FilterValue {
                value: value.to_string(),
                count_hint: *count_hint,
            })
            .collect();
        self.election
            .filter_metadata
            .get_or_insert_with(FilterMetadata::default)
            .columns
            .insert(column.to_string(), values);
        self
    }

    pub fn credentials(mut self, credentials: CredentialMetadata) -> ElectionBuilder {
        self.election.credential_metadata = Some(credentials);
        self
    }

    pub fn build(self) -> Election {
        self.election
    }
}

pub(crate) fn format_percentage(count: u64, total: u64) -> String {
    if total == 0 {
        "0.0%".to_string()
    } else {
        format!("{:.1}%", (count as f64 / total as f64) * 100.0)
    }
}
