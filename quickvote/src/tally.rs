//! Human adjudication of a machine tally.
//!
//! The server computes the tally and hands it over sorted by decreasing vote
//! count. The administrator then marks each candidate as a winner, a loser or
//! as going to a runoff. The rules checked here are a local gate in front of
//! the server: they are applied again on every submission, whatever the
//! caller did before.

use std::sync::Arc;

use log::{debug, info};
use snafu::prelude::*;

use crate::api::QuickVoteApi;
use crate::error::*;
use crate::mode::{classify, Phase};
use crate::model::*;
use crate::state::ElectionState;

/// Checks a set of decisions against the winner quota of the stage.
///
/// Rejects an assignment in which every candidate loses (including the empty
/// assignment) and one with more winners than the quota.
pub fn validate(decisions: &[Decision], winner_quota: u32) -> EngineResult<()> {
    ensure!(
        !decisions.iter().all(|d| *d == Decision::Lose),
        ValidationFailedSnafu {
            reason: ValidationReason::NoWinner
        }
    );
    let num_winners = decisions.iter().filter(|d| **d == Decision::Win).count();
    ensure!(
        num_winners <= winner_quota as usize,
        ValidationFailedSnafu {
            reason: ValidationReason::QuotaExceeded
        }
    );
    Ok(())
}

/// The decisions taken over one partial tally, in tally order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Adjudication {
    round: RoundId,
    entries: Vec<(TallyEntry, Decision)>,
}

impl Adjudication {
    /// Every candidate starts as [Decision::Runoff].
    pub fn from_tally(round: RoundId, tally: &[TallyEntry]) -> Adjudication {
        Adjudication {
            round,
            entries: tally
                .iter()
                .map(|e| (e.clone(), Decision::Runoff))
                .collect(),
        }
    }

    pub fn round(&self) -> RoundId {
        self.round
    }

    pub fn entries(&self) -> impl Iterator<Item = (&TallyEntry, Decision)> {
        self.entries.iter().map(|(e, d)| (e, *d))
    }

    pub fn decide(&mut self, name: &str, decision: Decision) -> EngineResult<()> {
        let idx = self
            .entries
            .iter()
            .position(|(e, _)| e.name == name)
            .context(ValidationFailedSnafu {
                reason: ValidationReason::UnknownCandidate,
            })?;
        self.decide_at(idx, decision)
    }

    pub fn decide_at(&mut self, index: usize, decision: Decision) -> EngineResult<()> {
        let entry = self
            .entries
            .get_mut(index)
            .context(ValidationFailedSnafu {
                reason: ValidationReason::UnknownCandidate,
            })?;
        entry.1 = decision;
        Ok(())
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.entries.iter().map(|(_, d)| *d).collect()
    }

    pub fn validate(&self, winner_quota: u32) -> EngineResult<()> {
        validate(&self.decisions(), winner_quota)
    }

    pub fn to_request(&self) -> AdjudicationRequest {
        AdjudicationRequest {
            round: self.round,
            results: self
                .entries
                .iter()
                .map(|(e, d)| CandidateDecision {
                    name: e.name.clone(),
                    decision: *d,
                })
                .collect(),
        }
    }
}

/// Submits adjudications for the stage awaiting one.
pub struct TallyAdjudicator<A: QuickVoteApi> {
    api: Arc<A>,
    state: Arc<ElectionState>,
}

impl<A: QuickVoteApi> Clone for TallyAdjudicator<A> {
    fn clone(&self) -> Self {
        TallyAdjudicator {
            api: self.api.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A: QuickVoteApi> TallyAdjudicator<A> {
    pub fn new(api: Arc<A>, state: Arc<ElectionState>) -> TallyAdjudicator<A> {
        TallyAdjudicator { api, state }
    }

    /// Starts an adjudication of the current partial tally.
    pub fn begin(&self) -> EngineResult<Adjudication> {
        let election = self.state.election();
        let (tally, _) = partial_tally(&election, "adjudicate")?;
        Ok(Adjudication::from_tally(election.round_id, tally))
    }

    /// Validates and submits an adjudication, then reloads the election.
    pub async fn submit(&self, adjudication: &Adjudication) -> EngineResult<Phase> {
        let operation = "submit adjudication";
        let _guard = self.state.begin(operation)?;

        let election = self.state.election();
        let (_, stage) = partial_tally(&election, operation)?;
        ensure!(
            adjudication.round == election.round_id,
            ValidationFailedSnafu {
                reason: ValidationReason::StaleRound
            }
        );
        adjudication.validate(stage.winner_quota)?;

        self.state.clear_results();
        let request = adjudication.to_request();
        debug!("submit: {:?}", request);
        self.api
            .submit_adjudication(&request)
            .await
            .context(TransportFailureSnafu { operation })?;
        let phase = self.state.reload(self.api.as_ref()).await?;
        info!("{}: round {} -> {}", operation, request.round, phase);
        Ok(phase)
    }
}

fn partial_tally<'a>(
    election: &'a Election,
    operation: &'static str,
) -> EngineResult<(&'a [TallyEntry], &'a Stage)> {
    let phase = classify(election)?;
    match (&election.partial_tally, election.current_stage()) {
        (Some(tally), Some(stage)) if phase == Phase::StagePartial => Ok((tally, stage)),
        _ => InvalidTransitionSnafu { operation, phase }.fail(),
    }
}
