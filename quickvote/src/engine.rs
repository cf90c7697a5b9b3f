use std::sync::Arc;

use log::info;
use snafu::prelude::*;
use tokio::sync::watch;

use crate::agenda::check_locked_stages;
use crate::api::QuickVoteApi;
use crate::error::*;
use crate::mode::{classify, Phase};
use crate::model::*;
use crate::polling::{PollingConfig, PollingHandle, PollingSupervisor};
use crate::round::RoundController;
use crate::state::{ElectionState, LoadState};
use crate::tally::TallyAdjudicator;

/// One election under administration.
///
/// The engine owns the shared election state and hands out the components
/// that act on it. All of them go through the same collaborator.
pub struct Engine<A: QuickVoteApi> {
    api: Arc<A>,
    state: Arc<ElectionState>,
}

impl<A: QuickVoteApi> Engine<A> {
    /// Loads the election and checks that it classifies.
    pub async fn load(api: Arc<A>) -> EngineResult<Engine<A>> {
        let election = api.load_election().await.context(TransportFailureSnafu {
            operation: "load election",
        })?;
        let phase = classify(&election)?;
        info!(
            "loaded {:?}: {} stages, round {}, phase {}",
            election.title,
            election.stages.len(),
            election.round_id,
            phase
        );
        Ok(Engine {
            api,
            state: Arc::new(ElectionState::new(election)),
        })
    }

    pub fn election(&self) -> Election {
        self.state.election()
    }

    pub fn phase(&self) -> EngineResult<Phase> {
        classify(&self.state.election())
    }

    pub fn ballot_count(&self) -> Option<BallotCount> {
        self.state.ballot_count()
    }

    pub fn quick_poll_summary(&self) -> Option<String> {
        self.state.quick_poll_summary()
    }

    pub fn is_loading(&self) -> bool {
        self.state.load_state() == LoadState::Loading
    }

    pub fn subscribe(&self) -> watch::Receiver<Election> {
        self.state.subscribe()
    }

    pub fn subscribe_ballots(&self) -> watch::Receiver<Option<BallotCount>> {
        self.state.subscribe_ballots()
    }

    /// Fetches the election again. Does not count as a transition.
    pub async fn refresh(&self) -> EngineResult<Phase> {
        self.state.reload(self.api.as_ref()).await
    }

    /// Saves the title, target date and stages of `edited`.
    ///
    /// Stages that already ran must be left as they are. The position of the
    /// election is never changed by a save.
    pub async fn save(&self, edited: &Election) -> EngineResult<()> {
        let operation = "save election";
        let _guard = self.state.begin(operation)?;

        let current = self.state.election();
        check_locked_stages(&current, edited)?;
        let mut merged = current;
        merged.title = edited.title.clone();
        merged.target_date = edited.target_date.clone();
        merged.stages = edited.stages.clone();
        classify(&merged)?;

        self.api
            .save_election(&merged)
            .await
            .context(TransportFailureSnafu { operation })?;
        info!(
            "{}: {:?} with {} stages",
            operation,
            merged.title,
            merged.stages.len()
        );
        self.state.publish(merged);
        Ok(())
    }

    /// Asks the server to mail each voter a personal secret link.
    ///
    /// Takes the in-flight slot so that the links are not sent twice.
    pub async fn send_links(&self) -> EngineResult<()> {
        let operation = "send links";
        let _guard = self.state.begin(operation)?;
        self.api
            .send_links()
            .await
            .context(TransportFailureSnafu { operation })?;
        match self.state.election().credential_metadata {
            Some(c) => info!("{}: sent to {} voters", operation, c.total_users),
            None => info!("{}: sent", operation),
        }
        Ok(())
    }

    pub fn rounds(&self) -> RoundController<A> {
        RoundController::new(self.api.clone(), self.state.clone())
    }

    pub fn adjudicator(&self) -> TallyAdjudicator<A> {
        TallyAdjudicator::new(self.api.clone(), self.state.clone())
    }

    /// Starts the ballot count supervisor. It stops when the handle is dropped.
    pub fn start_polling(&self, config: PollingConfig) -> PollingHandle {
        PollingSupervisor::new(self.api.clone(), self.state.clone(), config).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::{add_stage, edit_stage};
    use crate::builder::ElectionBuilder;
    use crate::simulator::{ApiCall, SimulatedServer};
    use crate::source::set_winner_quota;

    fn between() -> Election {
        ElectionBuilder::new("Assembly")
            .target_date("2026-11-03")
            .stage(Stage::new("Chair", CandidateSource::inline(&["A", "B"])))
            .stage(Stage::new("Treasurer", CandidateSource::Alternates))
            .stage_index(0.5)
            .round(RoundId(102))
            .build()
    }

    #[tokio::test]
    async fn load_rejects_malformed_election() {
        let mut e = between();
        e.stage_index = 0.3;
        let server = Arc::new(SimulatedServer::new(e));
        assert!(matches!(
            Engine::load(server).await,
            Err(EngineError::MalformedElectionState { .. })
        ));
    }

    #[tokio::test]
    async fn save_keeps_position() {
        let server = Arc::new(SimulatedServer::new(between()));
        let engine = Engine::load(server.clone()).await.unwrap();
        let edited = add_stage(&engine.election());
        let mut edited = edit_stage(&edited, 1, |s| set_winner_quota(s, 2)).unwrap();
        edited.title = "Annual assembly".to_string();
        edited.stage_index = -1.0;
        edited.round_id = RoundId(0);

        engine.save(&edited).await.unwrap();
        let saved = engine.election();
        assert_eq!(saved.title, "Annual assembly");
        assert_eq!(saved.stages.len(), 3);
        assert_eq!(saved.stages[1].winner_quota, 2);
        assert_eq!(saved.stage_index, 0.5);
        assert_eq!(saved.round_id, RoundId(102));
        assert_eq!(server.election(), saved);
    }

    #[tokio::test]
    async fn save_refuses_locked_stage_edits() {
        let server = Arc::new(SimulatedServer::new(between()));
        let engine = Engine::load(server.clone()).await.unwrap();
        server.clear_calls();
        let mut edited = engine.election();
        edited.stages[0].title = "President".to_string();
        assert_eq!(
            engine.save(&edited).await.unwrap_err().validation_reason(),
            Some(ValidationReason::StageLocked)
        );
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn save_refuses_removing_the_voting_stage() {
        let mut voting = between();
        voting.stage_index = 1.0;
        voting.round_id = RoundId(201);
        voting.stages.push(Stage::new("Budget", CandidateSource::YesNo));
        let server = Arc::new(SimulatedServer::new(voting));
        let engine = Engine::load(server.clone()).await.unwrap();
        server.clear_calls();

        let mut edited = engine.election();
        edited.stages.remove(1);
        assert_eq!(
            engine.save(&edited).await.unwrap_err().validation_reason(),
            Some(ValidationReason::StageLocked)
        );
        assert!(server.calls().is_empty());

        let edited = edit_stage(&engine.election(), 1, |s| set_winner_quota(s, 2)).unwrap();
        engine.save(&edited).await.unwrap();
        assert_eq!(server.election().stages[1].winner_quota, 2);
    }

    #[tokio::test]
    async fn send_links_is_a_single_request() {
        let server = Arc::new(SimulatedServer::new(between()));
        let engine = Arc::new(Engine::load(server.clone()).await.unwrap());
        server.clear_calls();
        engine.send_links().await.unwrap();
        assert_eq!(server.calls(), vec![ApiCall::SendLinks]);

        let gate = server.hold_requests();
        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send_links().await })
        };
        server.wait_for_calls(2).await;
        assert!(matches!(
            engine.send_links().await,
            Err(EngineError::TransitionInFlight { .. })
        ));
        gate.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(server.calls().len(), 2);
    }

    #[tokio::test]
    async fn refresh_picks_up_server_changes() {
        let server = Arc::new(SimulatedServer::new(between()));
        let engine = Engine::load(server.clone()).await.unwrap();
        server
            .request_transition(TransitionKind::AdvanceRound, RoundId(102), None)
            .await
            .unwrap();
        assert_eq!(engine.phase().unwrap(), Phase::Inbetween);
        assert_eq!(engine.refresh().await.unwrap(), Phase::Stage);
        assert_eq!(engine.election().round_id, RoundId(201));
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn components_share_state() {
        let server = Arc::new(SimulatedServer::new(between()));
        let engine = Engine::load(server.clone()).await.unwrap();
        let mut rx = engine.subscribe();
        engine.rounds().advance_round().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().stage_index, 1.0);
        assert!(engine.adjudicator().begin().is_err());
        assert!(server
            .calls()
            .contains(&ApiCall::Transition(TransitionKind::AdvanceRound, RoundId(102), None)));
    }
}
