//! Where the candidates of a stage come from.
//!
//! On the wire, a stage carries four nullable source fields of which at most
//! one is meant to be set. The engine reads them once, in a fixed priority
//! order, into the [CandidateSource] enum and writes back exactly one of them.

use std::fmt::Display;

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::*;
use crate::model::Stage;

pub const SLATE_BASE_URL: &str = "https://petitionbuilder.org/slate/";

const YES: &str = "Yes";
const NO: &str = "No";

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SourceKind {
    YesNo,
    Inline,
    Slate,
    Alternates,
    Linked,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::YesNo => "yes/no",
            SourceKind::Inline => "inline",
            SourceKind::Slate => "slate",
            SourceKind::Alternates => "alternates",
            SourceKind::Linked => "linked",
        };
        write!(f, "{}", s)
    }
}

/// A reference to a slate page, always stored as its full URL.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct SlateRef(String);

impl SlateRef {
    /// Accepts a bare slate id or a full slate URL.
    pub fn normalize(input: &str) -> SlateRef {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return SlateRef(String::new());
        }
        let id = trimmed.strip_prefix(SLATE_BASE_URL).unwrap_or(trimmed);
        SlateRef(format!("{}{}", SLATE_BASE_URL, id))
    }

    pub fn url(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        self.0.strip_prefix(SLATE_BASE_URL).unwrap_or(&self.0)
    }
}

/// The candidate list of a stage. Exactly one variant is active at a time.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(from = "SourceFields", into = "SourceFields")]
pub enum CandidateSource {
    /// The fixed binary ballot. Pins the stage to a single winner.
    YesNo,
    /// An ordered list of candidate names.
    Inline(Vec<String>),
    Slate(SlateRef),
    /// The losers of the previous stage.
    Alternates,
    /// The candidates of another election, by id.
    Linked(String),
}

impl CandidateSource {
    /// Builds an inline source. The list `["Yes", "No"]` is the binary source.
    pub fn inline(names: &[&str]) -> CandidateSource {
        CandidateSource::from_inline(names.iter().map(|s| s.to_string()).collect())
    }

    fn from_inline(names: Vec<String>) -> CandidateSource {
        if names.len() == 2 && names[0] == YES && names[1] == NO {
            CandidateSource::YesNo
        } else {
            CandidateSource::Inline(names)
        }
    }

    /// The blank configuration of each kind.
    pub fn empty(kind: SourceKind) -> CandidateSource {
        match kind {
            SourceKind::YesNo => CandidateSource::YesNo,
            SourceKind::Inline => CandidateSource::Inline(Vec::new()),
            SourceKind::Slate => CandidateSource::Slate(SlateRef(String::new())),
            SourceKind::Alternates => CandidateSource::Alternates,
            SourceKind::Linked => CandidateSource::Linked(String::new()),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            CandidateSource::YesNo => SourceKind::YesNo,
            CandidateSource::Inline(_) => SourceKind::Inline,
            CandidateSource::Slate(_) => SourceKind::Slate,
            CandidateSource::Alternates => SourceKind::Alternates,
            CandidateSource::Linked(_) => SourceKind::Linked,
        }
    }
}

/// The nullable wire representation of a [CandidateSource].
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFields {
    /// Comma-separated, ordered.
    #[serde(rename = "sourceInline", default)]
    pub source_inline: Option<String>,
    #[serde(rename = "sourceSlate", default)]
    pub source_slate: Option<String>,
    #[serde(rename = "sourceAlternates", default)]
    pub source_alternates: Option<bool>,
    #[serde(rename = "sourceLinked", default)]
    pub source_linked: Option<String>,
}

fn split_inline(s: &str) -> Vec<String> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    s.split(',').map(|x| x.trim().to_string()).collect()
}

// The probing order matters: a binary inline list wins over any other field
// that happens to be set.
impl From<SourceFields> for CandidateSource {
    fn from(fields: SourceFields) -> CandidateSource {
        if let Some(inline) = fields.source_inline {
            return CandidateSource::from_inline(split_inline(&inline));
        }
        if let Some(linked) = fields.source_linked {
            return CandidateSource::Linked(linked);
        }
        if let Some(slate) = fields.source_slate {
            return CandidateSource::Slate(SlateRef::normalize(&slate));
        }
        if fields.source_alternates == Some(true) {
            return CandidateSource::Alternates;
        }
        debug!("stage without any candidate source, reading it as an empty inline list");
        CandidateSource::Inline(Vec::new())
    }
}

impl From<CandidateSource> for SourceFields {
    fn from(source: CandidateSource) -> SourceFields {
        // Only the selected field is set, the others stay null.
        let mut fields = SourceFields::default();
        match source {
            CandidateSource::YesNo => {
                fields.source_inline = Some(format!("{},{}", YES, NO));
            }
            CandidateSource::Inline(names) => {
                fields.source_inline = Some(names.join(","));
            }
            CandidateSource::Slate(slate) => {
                fields.source_slate = Some(slate.0);
            }
            CandidateSource::Alternates => {
                fields.source_alternates = Some(true);
            }
            CandidateSource::Linked(id) => {
                fields.source_linked = Some(id);
            }
        }
        fields
    }
}

pub fn source_kind(stage: &Stage) -> SourceKind {
    stage.candidate_source.kind()
}

/// Replaces the candidate source of a stage.
///
/// The previous source is discarded. Switching to the binary source forces a
/// single winner; switching away from it leaves the quota at 1 until the
/// caller sets it.
pub fn set_source_kind(stage: &Stage, source: CandidateSource) -> Stage {
    let source = match source {
        CandidateSource::Inline(names) => CandidateSource::from_inline(names),
        x => x,
    };
    let mut res = stage.clone();
    if source == CandidateSource::YesNo {
        res.winner_quota = 1;
    }
    debug!(
        "set_source_kind: stage {:?}: {} -> {}",
        stage.title,
        stage.candidate_source.kind(),
        source.kind()
    );
    res.candidate_source = source;
    res
}

pub fn set_winner_quota(stage: &Stage, quota: u32) -> EngineResult<Stage> {
    ensure!(
        stage.source_kind() != SourceKind::YesNo,
        ValidationFailedSnafu {
            reason: ValidationReason::InvalidQuotaForBinarySource
        }
    );
    ensure!(
        quota > 0,
        ValidationFailedSnafu {
            reason: ValidationReason::InvalidQuota
        }
    );
    let mut res = stage.clone();
    res.winner_quota = quota;
    Ok(res)
}
