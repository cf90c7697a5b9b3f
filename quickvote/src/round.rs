use std::sync::Arc;

use log::{info, warn};
use snafu::prelude::*;

use crate::api::QuickVoteApi;
use crate::error::*;
use crate::mode::{classify, Phase};
use crate::model::*;
use crate::state::ElectionState;

/// Drives the election from one phase to the next.
///
/// Every operation follows the same sequence: claim the in-flight slot, check
/// the phase, clear cached results, send the request with the current round
/// token, then reload and reclassify the election. Nothing is changed locally
/// until the reload succeeds.
pub struct RoundController<A: QuickVoteApi> {
    api: Arc<A>,
    state: Arc<ElectionState>,
}

impl<A: QuickVoteApi> Clone for RoundController<A> {
    fn clone(&self) -> Self {
        RoundController {
            api: self.api.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A: QuickVoteApi> RoundController<A> {
    pub fn new(api: Arc<A>, state: Arc<ElectionState>) -> RoundController<A> {
        RoundController { api, state }
    }

    /// Opens the election. Valid in [Phase::Begin].
    pub async fn open(&self) -> EngineResult<Phase> {
        let (_, phase) = self
            .transition(TransitionKind::Open, &[Phase::Begin], None)
            .await?;
        Ok(phase)
    }

    /// Closes voting for the current stage. Valid in [Phase::Stage].
    pub async fn close_voting(&self) -> EngineResult<Phase> {
        let (_, phase) = self
            .transition(TransitionKind::CloseVoting, &[Phase::Stage], None)
            .await?;
        Ok(phase)
    }

    /// Starts a quick poll. Valid in [Phase::Begin] and [Phase::Inbetween].
    pub async fn start_quick_poll(&self, prompt: &str) -> EngineResult<Phase> {
        let (_, phase) = self
            .transition(
                TransitionKind::StartQuickPoll,
                &[Phase::Begin, Phase::Inbetween],
                Some(prompt),
            )
            .await?;
        Ok(phase)
    }

    /// Closes the open quick poll and returns the server's summary of the responses.
    /// Valid in [Phase::InbetweenQuickpoll].
    pub async fn close_quick_poll(&self) -> EngineResult<String> {
        let (ack, _) = self
            .transition(
                TransitionKind::CloseQuickPoll,
                &[Phase::InbetweenQuickpoll],
                None,
            )
            .await?;
        Ok(match ack {
            TransitionAck::QuickPollSummary(s) => s,
            TransitionAck::Ok => String::new(),
        })
    }

    /// Moves on to the next stage. Valid in [Phase::Inbetween].
    pub async fn advance_round(&self) -> EngineResult<Phase> {
        let (_, phase) = self
            .transition(TransitionKind::AdvanceRound, &[Phase::Inbetween], None)
            .await?;
        Ok(phase)
    }

    async fn transition(
        &self,
        kind: TransitionKind,
        allowed: &[Phase],
        prompt: Option<&str>,
    ) -> EngineResult<(TransitionAck, Phase)> {
        let operation = kind.operation();
        let _guard = self.state.begin(operation)?;

        let current = self.state.election();
        let phase = classify(&current)?;
        ensure!(
            allowed.contains(&phase),
            InvalidTransitionSnafu { operation, phase }
        );
        if kind == TransitionKind::AdvanceRound {
            ensure!(
                !current.completed,
                InvalidTransitionSnafu { operation, phase }
            );
        }
        if let Some(message) = current.configuration_error() {
            return ConfigurationBlockedSnafu { message }.fail();
        }
        let prompt = match (kind, prompt.map(str::trim)) {
            (TransitionKind::StartQuickPoll, Some(p)) if !p.is_empty() => Some(p),
            (TransitionKind::StartQuickPoll, _) => {
                return ValidationFailedSnafu {
                    reason: ValidationReason::EmptyPrompt,
                }
                .fail()
            }
            _ => None,
        };

        self.state.clear_results();
        info!(
            "{}: round {} in phase {}",
            operation, current.round_id, phase
        );
        let ack = self
            .api
            .request_transition(kind, current.round_id, prompt)
            .await
            .context(TransportFailureSnafu { operation })?;
        if kind == TransitionKind::CloseQuickPoll {
            // Published under the in-flight slot so a later transition clears it.
            let summary = match &ack {
                TransitionAck::QuickPollSummary(s) => s.clone(),
                TransitionAck::Ok => {
                    warn!("close_quick_poll: the server did not return a summary");
                    String::new()
                }
            };
            self.state.set_quick_poll_summary(summary);
        }
        let new_phase = self.state.reload(self.api.as_ref()).await?;
        info!("{}: now in phase {}", operation, new_phase);
        Ok((ack, new_phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElectionBuilder;
    use crate::simulator::{ApiCall, SimulatedServer};

    fn two_stages() -> ElectionBuilder {
        ElectionBuilder::new("Assembly")
            .stage(Stage::new("Chair", CandidateSource::inline(&["A", "B", "C"])))
            .stage(Stage::new("Motion", CandidateSource::YesNo))
    }

    fn controller(election: Election) -> (Arc<SimulatedServer>, Arc<ElectionState>, RoundController<SimulatedServer>) {
        let server = Arc::new(SimulatedServer::new(election.clone()));
        let state = Arc::new(ElectionState::new(election));
        let rc = RoundController::new(server.clone(), state.clone());
        (server, state, rc)
    }

    #[tokio::test]
    async fn open_outside_begin_issues_no_call() {
        let (server, _, rc) = controller(two_stages().stage_index(0.0).round(RoundId(101)).build());
        let err = rc.open().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                phase: Phase::Stage,
                ..
            }
        ));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn open_sends_current_round_and_reloads() {
        let (server, state, rc) = controller(two_stages().build());
        let phase = rc.open().await.unwrap();
        assert_eq!(phase, Phase::Stage);
        assert_eq!(
            server.calls(),
            vec![
                ApiCall::Transition(TransitionKind::Open, RoundId(0), None),
                ApiCall::LoadElection,
            ]
        );
        assert_eq!(state.election().stage_index, 0.0);
        assert_eq!(state.election().round_id, RoundId(101));
    }

    #[tokio::test]
    async fn empty_prompt_fails_fast() {
        let (server, _, rc) = controller(two_stages().build());
        let err = rc.start_quick_poll("   ").await.unwrap_err();
        assert_eq!(err.validation_reason(), Some(ValidationReason::EmptyPrompt));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn quick_poll_round_trip() {
        let (server, state, rc) = controller(two_stages().stage_index(0.5).round(RoundId(102)).build());
        server.record_ballots(RoundId(103), 4);
        assert_eq!(
            rc.start_quick_poll("Break for lunch?").await.unwrap(),
            Phase::InbetweenQuickpoll
        );
        let summary = rc.close_quick_poll().await.unwrap();
        assert!(summary.contains("Break for lunch?"));
        assert_eq!(state.quick_poll_summary(), Some(summary));
        assert_eq!(classify(&state.election()).unwrap(), Phase::Inbetween);
    }

    #[tokio::test]
    async fn configuration_error_blocks_transitions() {
        let mut election = two_stages().build();
        election.error_message = Some("No voters have been invited".to_string());
        let (server, _, rc) = controller(election);
        assert!(matches!(
            rc.open().await,
            Err(EngineError::ConfigurationBlocked { .. })
        ));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_keeps_previous_snapshot() {
        let election = two_stages().build();
        let (server, state, rc) = controller(election.clone());
        server.fail_next_request();
        assert!(matches!(
            rc.open().await,
            Err(EngineError::TransportFailure { .. })
        ));
        assert_eq!(state.election(), election);
    }

    #[tokio::test]
    async fn cannot_advance_completed_election() {
        let mut election = two_stages().stage_index(1.5).round(RoundId(202)).build();
        election.completed = true;
        let (server, _, rc) = controller(election);
        assert!(matches!(
            rc.advance_round().await,
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn second_transition_is_rejected_while_first_is_in_flight() {
        let (server, _, rc) = controller(two_stages().build());
        let gate = server.hold_requests();
        let first = {
            let rc = rc.clone();
            tokio::spawn(async move { rc.open().await })
        };
        server.wait_for_calls(1).await;
        assert!(matches!(
            rc.open().await,
            Err(EngineError::TransitionInFlight { .. })
        ));
        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), Phase::Stage);
    }

    #[tokio::test]
    async fn summary_is_kept_when_reload_fails() {
        let (server, state, rc) = controller(
            two_stages()
                .stage_index(0.5)
                .round(RoundId(103))
                .quick_poll("Adjourn?")
                .build(),
        );
        server.record_ballots(RoundId(103), 6);
        server.fail_next_load();
        assert!(matches!(
            rc.close_quick_poll().await,
            Err(EngineError::TransportFailure { .. })
        ));
        assert_eq!(
            state.quick_poll_summary().as_deref(),
            Some("Adjourn?: 6 of 10 responded")
        );
        assert_eq!(state.load_state(), crate::state::LoadState::Idle);

        // The next transition starts from a clean slate.
        state.reload(server.as_ref()).await.unwrap();
        rc.advance_round().await.unwrap();
        assert_eq!(state.quick_poll_summary(), None);
    }
}
