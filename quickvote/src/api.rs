use async_trait::async_trait;

use crate::error::ApiError;
use crate::model::*;
use crate::slate::Slate;

pub type ApiResult<T> = Result<T, ApiError>;

/// The remote QuickVote service, as seen by the engine.
///
/// Transport, authentication and serialization are left to the implementor.
#[async_trait]
pub trait QuickVoteApi: Send + Sync + 'static {
    /// Full snapshot of the election.
    async fn load_election(&self) -> ApiResult<Election>;

    /// Persists the editable parts of an election. Never moves the election
    /// to another stage or round.
    async fn save_election(&self, election: &Election) -> ApiResult<()>;

    /// The single mutating entry point for phase transitions. `prompt` is only
    /// set when starting a quick poll.
    async fn request_transition(
        &self,
        kind: TransitionKind,
        round_id: RoundId,
        prompt: Option<&str>,
    ) -> ApiResult<TransitionAck>;

    async fn submit_adjudication(&self, request: &AdjudicationRequest) -> ApiResult<()>;

    async fn fetch_ballot_count(&self, round_id: RoundId) -> ApiResult<BallotCount>;

    /// Mails every voter their personal secret link.
    async fn send_links(&self) -> ApiResult<()>;
}

/// The slate pages candidates can be drawn from.
#[async_trait]
pub trait SlateDirectory: Send + Sync + 'static {
    async fn list_slates(&self) -> ApiResult<Vec<Slate>>;

    async fn get_slate(&self, slate: &SlateRef) -> ApiResult<Slate>;
}
