//! An in-memory QuickVote server.
//!
//! It follows the progression rules the engine relies on and records every
//! call it receives. It backs the unit tests and the `demo` command of the
//! administrator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Notify;

use crate::api::{ApiResult, QuickVoteApi, SlateDirectory};
use crate::builder::format_percentage;
use crate::error::ApiError;
use crate::mode::StagePosition;
use crate::model::*;
use crate::slate::Slate;

const DEFAULT_ELIGIBLE_VOTERS: u64 = 10;

/// A call received by the [SimulatedServer].
#[derive(PartialEq, Debug, Clone)]
pub enum ApiCall {
    LoadElection,
    SaveElection(Election),
    Transition(TransitionKind, RoundId, Option<String>),
    Adjudication(AdjudicationRequest),
    BallotCount(RoundId),
    SendLinks,
    ListSlates,
    GetSlate(String),
}

struct Inner {
    election: Election,
    calls: Vec<ApiCall>,
    ballots: HashMap<RoundId, u64>,
    eligible_voters: u64,
    // Keyed by stage position.
    tallies: HashMap<usize, Vec<(String, u64)>>,
    // Keyed by slate id.
    slates: HashMap<String, Slate>,
    fail_next: bool,
    fail_next_load: bool,
    gate: Option<Arc<Notify>>,
    ballot_delay: Option<Duration>,
}

pub struct SimulatedServer {
    inner: Mutex<Inner>,
}

impl SimulatedServer {
    pub fn new(election: Election) -> SimulatedServer {
        SimulatedServer {
            inner: Mutex::new(Inner {
                election,
                calls: Vec::new(),
                ballots: HashMap::new(),
                eligible_voters: DEFAULT_ELIGIBLE_VOTERS,
                tallies: HashMap::new(),
                slates: HashMap::new(),
                fail_next: false,
                fail_next_load: false,
                gate: None,
                ballot_delay: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic in a test holding the lock poisons it; the data is still usable.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The server-side copy of the election.
    pub fn election(&self) -> Election {
        self.lock().election.clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Waits until at least `n` calls have been received.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.lock().calls.len() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Sets the number of ballots received for a round.
    pub fn record_ballots(&self, round_id: RoundId, received: u64) {
        self.lock().ballots.insert(round_id, received);
    }

    pub fn set_eligible_voters(&self, eligible_voters: u64) {
        self.lock().eligible_voters = eligible_voters;
    }

    /// Scripts the tally produced when voting closes on the given stage.
    pub fn set_tally(&self, stage: usize, entries: &[(&str, u64)]) {
        let entries = entries
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect();
        self.lock().tallies.insert(stage, entries);
    }

    /// Publishes a slate. Stages with this slate as their source vote on its items.
    pub fn add_slate(&self, slate: Slate) {
        self.lock().slates.insert(slate.slate_id.clone(), slate);
    }

    /// The next call fails with a transport error and changes nothing.
    pub fn fail_next_request(&self) {
        self.lock().fail_next = true;
    }

    /// The next election load fails. Other calls are unaffected.
    pub fn fail_next_load(&self) {
        self.lock().fail_next_load = true;
    }

    /// Transitions, adjudications and link mailings wait for a permit on the
    /// returned gate before they are applied.
    pub fn hold_requests(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().gate = Some(gate.clone());
        gate
    }

    pub fn release_requests(&self) {
        if let Some(gate) = self.lock().gate.take() {
            gate.notify_waiters();
        }
    }

    /// Ballot counts are answered after this delay.
    pub fn delay_ballot_counts(&self, delay: Duration) {
        self.lock().ballot_delay = Some(delay);
    }

    fn receive(&self, call: ApiCall) -> ApiResult<()> {
        let mut inner = self.lock();
        debug!("simulator: {:?}", call);
        inner.calls.push(call);
        if inner.fail_next {
            inner.fail_next = false;
            return Err("simulated transport failure".into());
        }
        Ok(())
    }

    async fn wait_for_gate(&self) {
        let gate = self.lock().gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

fn reject(message: String) -> ApiError {
    message.into()
}

fn check_round(election: &Election, round_id: RoundId) -> ApiResult<()> {
    if election.round_id != round_id {
        return Err(reject(format!(
            "stale round {}, the election is at round {}",
            round_id, election.round_id
        )));
    }
    if let Some(message) = election.configuration_error() {
        return Err(reject(message.to_string()));
    }
    Ok(())
}

fn next_round(round_id: RoundId) -> RoundId {
    RoundId::new(round_id.stage_ordinal(), round_id.round_in_stage() + 1)
}


fn record_winners(election: &mut Election, stage: usize, winners: Vec<String>) {
    if election.stage_outcomes.len() <= stage {
        election
            .stage_outcomes
            .resize(stage + 1, StageOutcome::default());
    }
    election.stage_outcomes[stage].winners.extend(winners);
}

impl Inner {
    fn candidates(&self, stage: &Stage) -> Vec<String> {
        match &stage.candidate_source {
            CandidateSource::YesNo => vec!["Yes".to_string(), "No".to_string()],
            CandidateSource::Inline(names) => names.clone(),
            CandidateSource::Slate(slate) => self
                .slates
                .get(slate.id())
                .map(|s| s.candidates())
                .unwrap_or_default(),
            CandidateSource::Alternates | CandidateSource::Linked(_) => Vec::new(),
        }
    }

    fn close_voting(&mut self, n: usize) -> ApiResult<()> {
        let stage = self
            .election
            .stages
            .get(n)
            .ok_or_else(|| reject(format!("no stage {}", n)))?
            .clone();
        let mut counts = match self.tallies.get(&n) {
            Some(scripted) => scripted.clone(),
            None => self.candidates(&stage).into_iter().map(|c| (c, 0)).collect(),
        };
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        if stage.policy != Stage::DEFAULT_POLICY {
            // Automatic policies adjudicate on the spot.
            let winners = counts
                .iter()
                .take(stage.winner_quota as usize)
                .map(|(name, _)| name.clone())
                .collect();
            record_winners(&mut self.election, n, winners);
            self.election.stage_index = StagePosition::Between(n).to_index();
            self.election.round_id = next_round(self.election.round_id);
            return Ok(());
        }

        let total: u64 = counts.iter().map(|(_, c)| *c).sum();
        let tally = counts
            .into_iter()
            .map(|(name, vote_count)| TallyEntry {
                name,
                vote_count,
                vote_percentage: format_percentage(vote_count, total),
                decision: None,
                rationale: String::new(),
            })
            .collect();
        self.election.partial_tally = Some(tally);
        Ok(())
    }

    fn apply_transition(
        &mut self,
        kind: TransitionKind,
        round_id: RoundId,
        prompt: Option<&str>,
    ) -> ApiResult<TransitionAck> {
        check_round(&self.election, round_id)?;
        let position = self.election.position().map_err(|e| reject(e.to_string()))?;
        let quick_poll = self.election.active_quick_poll().map(|s| s.to_string());
        let has_tally = self.election.partial_tally.is_some();
        match (kind, position, quick_poll) {
            (TransitionKind::Open, StagePosition::NotStarted, None) => {
                self.election.stage_index = StagePosition::Voting(0).to_index();
                self.election.round_id = RoundId::new(1, 1);
            }
            (TransitionKind::CloseVoting, StagePosition::Voting(n), None) if !has_tally => {
                self.close_voting(n)?;
            }
            (TransitionKind::StartQuickPoll, StagePosition::NotStarted, None)
            | (TransitionKind::StartQuickPoll, StagePosition::Between(_), None) => {
                let prompt = prompt
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| reject("a quick poll needs a prompt".to_string()))?;
                self.election.active_quick_poll_prompt = Some(prompt.to_string());
                self.election.round_id = next_round(round_id);
            }
            (TransitionKind::CloseQuickPoll, _, Some(asked)) => {
                let received = self.ballots.get(&round_id).copied().unwrap_or(0);
                let summary = format!(
                    "{}: {} of {} responded",
                    asked, received, self.eligible_voters
                );
                self.election.active_quick_poll_prompt = None;
                self.election.round_id = next_round(round_id);
                return Ok(TransitionAck::QuickPollSummary(summary));
            }
            (TransitionKind::AdvanceRound, StagePosition::Between(n), None)
                if !self.election.completed =>
            {
                if n + 1 < self.election.stages.len() {
                    self.election.stage_index = StagePosition::Voting(n + 1).to_index();
                    self.election.round_id = RoundId::new(n as u32 + 2, 1);
                } else {
                    self.election.completed = true;
                }
            }
            _ => {
                return Err(reject(format!(
                    "{} is not allowed at stage {}",
                    kind.operation(),
                    self.election.stage_index
                )))
            }
        }
        Ok(TransitionAck::Ok)
    }

    fn apply_adjudication(&mut self, request: &AdjudicationRequest) -> ApiResult<()> {
        check_round(&self.election, request.round)?;
        let n = match self.election.position() {
            Ok(StagePosition::Voting(n)) if self.election.partial_tally.is_some() => n,
            _ => return Err(reject("no tally awaits adjudication".to_string())),
        };
        let e = &mut self.election;
        let winners: Vec<String> = request
            .results
            .iter()
            .filter(|r| r.decision == Decision::Win)
            .map(|r| r.name.clone())
            .collect();
        let runoff: Vec<(String, u64)> = request
            .results
            .iter()
            .filter(|r| r.decision == Decision::Runoff)
            .map(|r| (r.name.clone(), 0))
            .collect();
        record_winners(e, n, winners);
        e.partial_tally = None;
        e.round_id = next_round(e.round_id);
        if runoff.is_empty() {
            e.stage_index = StagePosition::Between(n).to_index();
            self.tallies.remove(&n);
        } else {
            // The next round is voted among the runoff candidates only.
            self.tallies.insert(n, runoff);
        }
        Ok(())
    }
}

#[async_trait]
impl QuickVoteApi for SimulatedServer {
    async fn load_election(&self) -> ApiResult<Election> {
        self.receive(ApiCall::LoadElection)?;
        let mut inner = self.lock();
        if inner.fail_next_load {
            inner.fail_next_load = false;
            return Err("simulated load failure".into());
        }
        Ok(inner.election.clone())
    }

    async fn save_election(&self, election: &Election) -> ApiResult<()> {
        self.receive(ApiCall::SaveElection(election.clone()))?;
        let mut inner = self.lock();
        inner.election.title = election.title.clone();
        inner.election.target_date = election.target_date.clone();
        inner.election.stages = election.stages.clone();
        Ok(())
    }

    async fn request_transition(
        &self,
        kind: TransitionKind,
        round_id: RoundId,
        prompt: Option<&str>,
    ) -> ApiResult<TransitionAck> {
        self.receive(ApiCall::Transition(
            kind,
            round_id,
            prompt.map(|p| p.to_string()),
        ))?;
        self.wait_for_gate().await;
        self.lock().apply_transition(kind, round_id, prompt)
    }

    async fn submit_adjudication(&self, request: &AdjudicationRequest) -> ApiResult<()> {
        self.receive(ApiCall::Adjudication(request.clone()))?;
        self.wait_for_gate().await;
        self.lock().apply_adjudication(request)
    }

    async fn fetch_ballot_count(&self, round_id: RoundId) -> ApiResult<BallotCount> {
        self.receive(ApiCall::BallotCount(round_id))?;
        let delay = self.lock().ballot_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let inner = self.lock();
        Ok(BallotCount {
            received: inner.ballots.get(&round_id).copied().unwrap_or(0),
            total_eligible: inner.eligible_voters,
        })
    }

    async fn send_links(&self) -> ApiResult<()> {
        self.receive(ApiCall::SendLinks)?;
        self.wait_for_gate().await;
        Ok(())
    }
}

#[async_trait]
impl SlateDirectory for SimulatedServer {
    async fn list_slates(&self) -> ApiResult<Vec<Slate>> {
        self.receive(ApiCall::ListSlates)?;
        let mut slates: Vec<Slate> = self.lock().slates.values().cloned().collect();
        slates.sort_by(|a, b| a.slate_id.cmp(&b.slate_id));
        Ok(slates)
    }

    async fn get_slate(&self, slate: &SlateRef) -> ApiResult<Slate> {
        self.receive(ApiCall::GetSlate(slate.id().to_string()))?;
        self.lock()
            .slates
            .get(slate.id())
            .cloned()
            .ok_or_else(|| reject(format!("no slate {}", slate.id())))
    }
}
