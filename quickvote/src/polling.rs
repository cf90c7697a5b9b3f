//! Live ballot counts.
//!
//! The supervisor watches the shared election. While ballots are being
//! collected it fetches the count for the current round on a fixed interval
//! and right after every change of the election. Otherwise it sits idle.
//! A fetch still in flight when the election changes or the supervisor is
//! cancelled is dropped and its result never reaches the cache.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::QuickVoteApi;
use crate::mode::classify;
use crate::state::ElectionState;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct PollingConfig {
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval: Duration::from_secs(8),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum PollState {
    Idle,
    Polling,
}

enum Wake<T> {
    Cancelled,
    ElectionChanged,
    Ready(T),
}

pub struct PollingSupervisor<A: QuickVoteApi> {
    api: Arc<A>,
    state: Arc<ElectionState>,
    config: PollingConfig,
}

impl<A: QuickVoteApi> PollingSupervisor<A> {
    /// A zero interval is replaced by the default one.
    pub fn new(api: Arc<A>, state: Arc<ElectionState>, config: PollingConfig) -> Self {
        let config = if config.interval.is_zero() {
            let default = PollingConfig::default();
            warn!(
                "polling: a zero interval is not allowed, using {:?}",
                default.interval
            );
            default
        } else {
            config
        };
        PollingSupervisor { api, state, config }
    }

    /// Starts supervising on the current tokio runtime.
    pub fn spawn(self) -> PollingHandle {
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(PollState::Idle);
        let task = tokio::spawn(self.run(cancel.clone(), status_tx));
        PollingHandle {
            cancel,
            status: status_rx,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken, status: watch::Sender<PollState>) {
        let mut election_rx = self.state.subscribe();
        'supervise: loop {
            let election = election_rx.borrow_and_update().clone();
            let collecting = match classify(&election) {
                Ok(phase) => phase.collects_ballots(),
                Err(e) => {
                    warn!("polling: cannot classify the election: {}", e);
                    false
                }
            };

            if !collecting {
                status.send_replace(PollState::Idle);
                match wait_for(&cancel, &mut election_rx, std::future::pending::<()>()).await {
                    Wake::Cancelled => break 'supervise,
                    _ => continue 'supervise,
                }
            }

            status.send_replace(PollState::Polling);
            let round_id = election.round_id;
            debug!(
                "polling: round {} every {:?}",
                round_id, self.config.interval
            );
            // The first tick completes at once.
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                match wait_for(&cancel, &mut election_rx, ticker.tick()).await {
                    Wake::Cancelled => break 'supervise,
                    Wake::ElectionChanged => continue 'supervise,
                    Wake::Ready(_) => {}
                }
                let fetch = self.api.fetch_ballot_count(round_id);
                match wait_for(&cancel, &mut election_rx, fetch).await {
                    Wake::Cancelled => break 'supervise,
                    Wake::ElectionChanged => {
                        debug!("polling: dropping the count for round {}", round_id);
                        continue 'supervise;
                    }
                    Wake::Ready(Ok(count)) => {
                        debug!("polling: round {}: {}", round_id, count);
                        self.state.set_ballot_count(count);
                    }
                    Wake::Ready(Err(e)) => {
                        warn!("polling: ballot count for round {} failed: {}", round_id, e);
                    }
                }
            }
        }
        status.send_replace(PollState::Idle);
        info!("polling: stopped");
    }
}

// Cancellation and election changes take precedence over a result that
// becomes ready at the same time.
async fn wait_for<F: std::future::Future>(
    cancel: &CancellationToken,
    election_rx: &mut watch::Receiver<crate::model::Election>,
    fut: F,
) -> Wake<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wake::Cancelled,
        changed = election_rx.changed() => match changed {
            Ok(()) => Wake::ElectionChanged,
            // The state is gone, nothing left to watch.
            Err(_) => Wake::Cancelled,
        },
        out = fut => Wake::Ready(out),
    }
}

/// Controls a running [PollingSupervisor]. Dropping the handle cancels it.
pub struct PollingHandle {
    cancel: CancellationToken,
    status: watch::Receiver<PollState>,
    task: Option<JoinHandle<()>>,
}

impl PollingHandle {
    pub fn state(&self) -> PollState {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.status.clone()
    }

    /// Cancels the supervisor and waits for it to stop.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("polling: supervisor task failed: {}", e);
            }
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
