// ********* Election data structures ***********

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::mode::StagePosition;
pub use crate::source::{CandidateSource, SlateRef, SourceKind};

/// The stage-and-round token sent with every transition request.
///
/// The two low decimal digits hold the round within the stage, the rest holds
/// the stage ordinal. The engine never computes the next value itself: it is
/// only refreshed by reloading the election after the server acknowledged a
/// transition.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u32);

impl RoundId {
    pub fn new(stage_ordinal: u32, round_in_stage: u32) -> RoundId {
        RoundId(stage_ordinal * 100 + round_in_stage % 100)
    }

    pub fn stage_ordinal(&self) -> u32 {
        self.0 / 100
    }

    pub fn round_in_stage(&self) -> u32 {
        self.0 % 100
    }
}

impl Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The human decision attached to a tallied candidate.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum Decision {
    Win,
    Lose,
    Runoff,
}

impl Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Win => "Win",
            Decision::Lose => "Lose",
            Decision::Runoff => "Runoff",
        };
        write!(f, "{}", s)
    }
}

/// One candidate's result in a partial tally, as computed by the server.
///
/// Entries arrive sorted by decreasing vote count and that order is kept.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyEntry {
    pub name: String,
    pub vote_count: u64,
    /// Already formatted by the tallying service.
    #[serde(default)]
    pub vote_percentage: String,
    /// `None` while undecided.
    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub rationale: String,
}

/// The winners decided for a concluded stage.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOutcome {
    #[serde(default)]
    pub winners: Vec<String>,
}

/// A counting rule advertised by the server. Opaque to the engine.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDescription {
    pub key: String,
    #[serde(default)]
    pub description: String,
}

/// Restricts the voters allowed in a stage to those whose `attribute` equals `value`.
///
/// Stored on the wire as `"Column:Value"`.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoterFilter {
    pub attribute: String,
    pub value: String,
}

impl VoterFilter {
    pub fn parse(s: &str) -> Result<VoterFilter, String> {
        match s.split_once(':') {
            Some((attribute, value)) if !attribute.is_empty() => Ok(VoterFilter {
                attribute: attribute.to_string(),
                value: value.to_string(),
            }),
            _ => Err(format!("voter filter {:?} is not of the form Column:Value", s)),
        }
    }
}

impl TryFrom<String> for VoterFilter {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        VoterFilter::parse(&s)
    }
}

impl From<VoterFilter> for String {
    fn from(vf: VoterFilter) -> String {
        format!("{}:{}", vf.attribute, vf.value)
    }
}

/// A value of a voter attribute, with the number of voters that have it.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterValue {
    pub value: String,
    #[serde(default)]
    pub count_hint: u64,
}

/// The voter attributes a stage can be restricted on, by column name.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterMetadata {
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<FilterValue>>,
}

/// A report offered by the server as a CSV download.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub title: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub url_csv_download: String,
}

/// Who may vote, and how they are invited.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub count_ever_logged_in: u64,
    #[serde(default)]
    pub public_vote_url: String,
    #[serde(default)]
    pub url_csv_download_secret_links: String,
}

impl CredentialMetadata {
    pub fn logged_in_percentage(&self) -> f64 {
        if self.total_users == 0 {
            0.0
        } else {
            (self.count_ever_logged_in as f64 / self.total_users as f64) * 100.0
        }
    }
}

/// One ballot definition of an election.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Counting rule, forwarded verbatim to the server.
    pub policy: String,
    pub title: String,
    #[serde(rename = "nWinners")]
    pub winner_quota: u32,
    /// If true, ballots must select exactly `winner_quota` candidates.
    #[serde(rename = "forbidUndervote", default)]
    pub exact_winner_count: bool,
    #[serde(flatten)]
    pub candidate_source: CandidateSource,
    #[serde(rename = "filterUser", default, skip_serializing_if = "Option::is_none")]
    pub voter_filter: Option<VoterFilter>,
}

impl Stage {
    pub const DEFAULT_POLICY: &'static str = "Manual";

    pub fn new(title: &str, candidate_source: CandidateSource) -> Stage {
        Stage {
            policy: Stage::DEFAULT_POLICY.to_string(),
            title: title.to_string(),
            winner_quota: 1,
            exact_winner_count: false,
            candidate_source,
            voter_filter: None,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.candidate_source.kind()
    }
}

/// The root aggregate, as loaded from and saved to the server.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub title: String,
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// -1 before the election opens, `n` while stage `n` votes or awaits
    /// adjudication, `n + 0.5` between stage `n` and stage `n + 1`.
    #[serde(rename = "stage")]
    pub stage_index: f64,
    #[serde(rename = "stageRoundMoniker", default)]
    pub round_id: RoundId,
    #[serde(rename = "activeQuickPollMessage", default)]
    pub active_quick_poll_prompt: Option<String>,
    #[serde(default)]
    pub partial_tally: Option<Vec<TallyEntry>>,
    #[serde(rename = "done", default)]
    pub completed: bool,
    #[serde(rename = "stageResults", default)]
    pub stage_outcomes: Vec<StageOutcome>,
    /// Configuration error reported by the server. Blocks transitions.
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub policy_details: Vec<PolicyDescription>,
    // Server-provided. Carried through a save unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_metadata: Option<FilterMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_metadata: Option<Vec<ReportMetadata>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_metadata: Option<CredentialMetadata>,
}

impl Election {
    pub fn position(&self) -> Result<StagePosition, EngineError> {
        StagePosition::from_index(self.stage_index)
    }

    /// The quick poll prompt, if a quick poll is open. An empty prompt counts as none.
    pub fn active_quick_poll(&self) -> Option<&str> {
        self.active_quick_poll_prompt
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    pub fn configuration_error(&self) -> Option<&str> {
        self.error_message.as_deref().filter(|s| !s.is_empty())
    }

    /// The known values of a voter attribute, or `None` if the column is unknown.
    pub fn filter_values(&self, column: &str) -> Option<&[FilterValue]> {
        self.filter_metadata
            .as_ref()
            .and_then(|m| m.columns.get(column))
            .map(|v| v.as_slice())
    }

    /// The stage currently voting or awaiting adjudication.
    pub fn current_stage(&self) -> Option<&Stage> {
        match self.position() {
            Ok(StagePosition::Voting(n)) => self.stages.get(n),
            _ => None,
        }
    }
}

/// Live ballot counts for the open stage or quick poll.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotCount {
    pub received: u64,
    pub total_eligible: u64,
}

impl BallotCount {
    pub fn percentage(&self) -> f64 {
        if self.total_eligible == 0 {
            0.0
        } else {
            (self.received as f64 / self.total_eligible as f64) * 100.0
        }
    }
}

impl Display for BallotCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} ({:.1}%)",
            self.received,
            self.total_eligible,
            self.percentage()
        )
    }
}

// ********* Collaborator requests ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TransitionKind {
    Open,
    CloseVoting,
    StartQuickPoll,
    CloseQuickPoll,
    AdvanceRound,
}

impl TransitionKind {
    pub fn operation(&self) -> &'static str {
        match self {
            TransitionKind::Open => "open",
            TransitionKind::CloseVoting => "close voting",
            TransitionKind::StartQuickPoll => "start quick poll",
            TransitionKind::CloseQuickPoll => "close quick poll",
            TransitionKind::AdvanceRound => "advance round",
        }
    }
}

/// The server's answer to a transition request.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TransitionAck {
    Ok,
    QuickPollSummary(String),
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDecision {
    pub name: String,
    pub decision: Decision,
}

/// Body of an adjudication submission. `results` keeps the tally order.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AdjudicationRequest {
    pub round: RoundId,
    pub results: Vec<CandidateDecision>,
}
