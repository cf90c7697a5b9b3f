use log::{debug, info};
use snafu::prelude::*;
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::api::QuickVoteApi;
use crate::error::*;
use crate::mode::{classify, Phase};
use crate::model::{BallotCount, Election};

/// Whether a mutating operation is outstanding.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum LoadState {
    Idle,
    Loading,
}

/// The last known election and the caches derived from it, shared by the
/// round controller, the adjudicator and the polling supervisor.
pub struct ElectionState {
    election: watch::Sender<Election>,
    ballots: watch::Sender<Option<BallotCount>>,
    quick_poll_summary: watch::Sender<Option<String>>,
    // Held for the whole duration of a transition, adjudication or save.
    in_flight: Mutex<()>,
}

impl ElectionState {
    pub fn new(election: Election) -> ElectionState {
        ElectionState {
            election: watch::channel(election).0,
            ballots: watch::channel(None).0,
            quick_poll_summary: watch::channel(None).0,
            in_flight: Mutex::new(()),
        }
    }

    pub fn election(&self) -> Election {
        self.election.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Election> {
        self.election.subscribe()
    }

    pub fn ballot_count(&self) -> Option<BallotCount> {
        *self.ballots.borrow()
    }

    pub fn subscribe_ballots(&self) -> watch::Receiver<Option<BallotCount>> {
        self.ballots.subscribe()
    }

    pub fn quick_poll_summary(&self) -> Option<String> {
        self.quick_poll_summary.borrow().clone()
    }

    pub fn load_state(&self) -> LoadState {
        match self.in_flight.try_lock() {
            Ok(_) => LoadState::Idle,
            Err(_) => LoadState::Loading,
        }
    }

    /// Claims the single in-flight slot. A second caller is rejected, not queued.
    pub(crate) fn begin(&self, operation: &'static str) -> EngineResult<MutexGuard<'_, ()>> {
        match self.in_flight.try_lock() {
            Ok(guard) => Ok(guard),
            Err(_) => TransitionInFlightSnafu { operation }.fail(),
        }
    }

    pub(crate) fn clear_results(&self) {
        self.ballots.send_replace(None);
        self.quick_poll_summary.send_replace(None);
    }

    pub(crate) fn set_ballot_count(&self, count: BallotCount) {
        self.ballots.send_replace(Some(count));
    }

    pub(crate) fn set_quick_poll_summary(&self, summary: String) {
        self.quick_poll_summary.send_replace(Some(summary));
    }

    pub(crate) fn publish(&self, election: Election) {
        self.election.send_replace(election);
    }

    /// Fetches a fresh snapshot and installs it if it classifies.
    ///
    /// On failure the previous snapshot stays in place.
    pub(crate) async fn reload<A: QuickVoteApi + ?Sized>(&self, api: &A) -> EngineResult<Phase> {
        let election = api.load_election().await.context(TransportFailureSnafu {
            operation: "load election",
        })?;
        let phase = classify(&election)?;
        debug!(
            "reload: stage index {} round {} -> {}",
            election.stage_index, election.round_id, phase
        );
        if let Some(message) = election.configuration_error() {
            info!("reload: server reports a configuration error: {}", message);
        }
        self.publish(election);
        Ok(phase)
    }
}
