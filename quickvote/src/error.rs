use std::fmt::Display;

use snafu::prelude::*;

use crate::mode::Phase;

/// The error returned by a collaborator call.
pub type ApiError = Box<dyn std::error::Error + Send + Sync>;

/// Local precondition failures. The string forms are stable.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ValidationReason {
    /// Every tallied candidate was marked as losing.
    NoWinner,
    /// More winners than the stage allows.
    QuotaExceeded,
    /// Yes/No stages always elect exactly one winner.
    InvalidQuotaForBinarySource,
    InvalidQuota,
    EmptyPrompt,
    /// The stage has already been voted on or is being voted on.
    StageLocked,
    NoSuchStage,
    UnknownCandidate,
    /// The voter attribute or value is not offered by the server.
    UnknownFilter,
    /// The adjudication was prepared for another round.
    StaleRound,
}

impl Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationReason::NoWinner => "no-winner",
            ValidationReason::QuotaExceeded => "quota-exceeded",
            ValidationReason::InvalidQuotaForBinarySource => "InvalidQuotaForBinarySource",
            ValidationReason::InvalidQuota => "invalid-quota",
            ValidationReason::EmptyPrompt => "empty-prompt",
            ValidationReason::StageLocked => "stage-locked",
            ValidationReason::NoSuchStage => "no-such-stage",
            ValidationReason::UnknownCandidate => "unknown-candidate",
            ValidationReason::UnknownFilter => "unknown-filter",
            ValidationReason::StaleRound => "stale-round",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("Malformed election state: {detail}"))]
    MalformedElectionState { detail: String },

    #[snafu(display("Cannot {operation} while the election is in phase {phase}"))]
    InvalidTransition {
        operation: &'static str,
        phase: Phase,
    },

    #[snafu(display("Cannot {operation}: another operation is still in flight"))]
    TransitionInFlight { operation: &'static str },

    #[snafu(display("Validation failed: {reason}"))]
    ValidationFailed { reason: ValidationReason },

    #[snafu(display("Transitions are blocked by a configuration error: {message}"))]
    ConfigurationBlocked { message: String },

    #[snafu(display("Failed to {operation}: {source}"))]
    TransportFailure {
        operation: &'static str,
        source: ApiError,
    },
}

impl EngineError {
    pub fn validation_reason(&self) -> Option<ValidationReason> {
        match self {
            EngineError::ValidationFailed { reason } => Some(*reason),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
