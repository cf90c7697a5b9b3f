//! HTTP clients for the QuickVote management API and the slate directory.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, warn};
use quickvote::*;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::qv::config_reader::AdminConfig;
use crate::qv::{HttpClientSnafu, QvResult};

#[derive(Debug, Snafu)]
#[snafu(display("QuickVote API error ({status}) on {url}: {body}"))]
pub struct RequestRejected {
    url: String,
    status: StatusCode,
    body: String,
}

/// Answer of the ballot count endpoint.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageResponse {
    #[serde(default)]
    pub num_users: u64,
    #[serde(default)]
    pub quick_poll_count_ballots_received: u64,
    #[serde(default)]
    pub count_ballots_received: u64,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Serialize)]
struct QuickPollRequest<'a> {
    message: &'a str,
}

// The reqwest client and the credentials shared by both services.
#[derive(Clone)]
struct Transport {
    client: Client,
    token: Option<String>,
}

impl Transport {
    fn new(config: &AdminConfig) -> QvResult<Transport> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context(HttpClientSnafu)?;
        let token = config.auth_token();
        if token.is_none() {
            warn!("No auth token configured, requests will be anonymous");
        }
        Ok(Transport { client, token })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> ApiResult<Response> {
        debug!("request: {}", url);
        let response = self.authorized(req).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RequestRejected {
                url: url.to_string(),
                status,
                body,
            }
            .into())
        }
    }
}

pub struct HttpApi {
    transport: Transport,
    server: String,
    sheet_id: String,
    short_id: String,
    // Set from the last loaded election; picks the counter of the ballot count answer.
    quick_poll_open: AtomicBool,
}

impl HttpApi {
    pub fn new(config: &AdminConfig) -> QvResult<HttpApi> {
        Ok(HttpApi {
            transport: Transport::new(config)?,
            server: config.server.trim_end_matches('/').to_string(),
            sheet_id: config.sheet_id.clone(),
            short_id: config.short_id().to_string(),
            quick_poll_open: AtomicBool::new(false),
        })
    }

    /// The slate directory, reached with the same credentials.
    pub fn slates(&self, config: &AdminConfig) -> HttpSlates {
        HttpSlates {
            transport: self.transport.clone(),
            server: config.slate_server.trim_end_matches('/').to_string(),
        }
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> ApiResult<Response> {
        self.transport.send(url, req).await
    }

    async fn post_empty(&self, url: &str) -> ApiResult<Response> {
        let req = self.transport.client.post(url).json(&serde_json::json!({}));
        self.send(url, req).await
    }

    fn manage_url(&self, action: Option<&str>) -> String {
        match action {
            None => format!("{}/api/manage/{}", self.server, self.sheet_id),
            Some(a) => format!("{}/api/manage/{}/{}", self.server, self.sheet_id, a),
        }
    }

    fn ballot_count_url(&self, round_id: RoundId) -> String {
        format!(
            "{}/election/{}/ajaxmanage?round={}",
            self.server, self.short_id, round_id
        )
    }
}

#[async_trait]
impl QuickVoteApi for HttpApi {
    async fn load_election(&self) -> ApiResult<Election> {
        let url = self.manage_url(None);
        let response = self.send(&url, self.transport.client.get(&url)).await?;
        let election: Election = response.json().await?;
        self.quick_poll_open
            .store(election.active_quick_poll().is_some(), Ordering::Relaxed);
        Ok(election)
    }

    async fn save_election(&self, election: &Election) -> ApiResult<()> {
        let url = self.manage_url(None);
        self.send(&url, self.transport.client.post(&url).json(election))
            .await?;
        Ok(())
    }

    async fn request_transition(
        &self,
        kind: TransitionKind,
        round_id: RoundId,
        prompt: Option<&str>,
    ) -> ApiResult<TransitionAck> {
        match kind {
            TransitionKind::Open | TransitionKind::CloseVoting | TransitionKind::AdvanceRound => {
                let url = self.manage_url(Some(&format!("MoveNextRound?round={}", round_id)));
                self.post_empty(&url).await?;
                Ok(TransitionAck::Ok)
            }
            TransitionKind::StartQuickPoll => {
                let url = self.manage_url(Some(&format!("QuickPoll?round={}", round_id)));
                let body = QuickPollRequest {
                    message: prompt.unwrap_or_default(),
                };
                self.send(&url, self.transport.client.post(&url).json(&body))
                    .await?;
                Ok(TransitionAck::Ok)
            }
            TransitionKind::CloseQuickPoll => {
                let url = self.manage_url(Some(&format!("CloseQuickPoll?round={}", round_id)));
                let response = self.post_empty(&url).await?;
                let summary = response.text().await?;
                if summary.trim().is_empty() {
                    Ok(TransitionAck::Ok)
                } else {
                    Ok(TransitionAck::QuickPollSummary(summary))
                }
            }
        }
    }

    async fn submit_adjudication(&self, request: &AdjudicationRequest) -> ApiResult<()> {
        let url = self.manage_url(Some("Adjudicate"));
        self.send(&url, self.transport.client.post(&url).json(request))
            .await?;
        Ok(())
    }

    async fn fetch_ballot_count(&self, round_id: RoundId) -> ApiResult<BallotCount> {
        let url = self.ballot_count_url(round_id);
        let response = self.post_empty(&url).await?;
        let manage: ManageResponse = response.json().await?;
        if let Some(message) = manage.error_message.as_deref().filter(|m| !m.is_empty()) {
            warn!("ballot count: server reports a configuration error: {}", message);
        }
        Ok(to_ballot_count(
            &manage,
            self.quick_poll_open.load(Ordering::Relaxed),
        ))
    }

    async fn send_links(&self) -> ApiResult<()> {
        let url = self.manage_url(Some("sendlinks"));
        self.post_empty(&url).await?;
        Ok(())
    }
}

/// Client for the slate directory of the petition site.
pub struct HttpSlates {
    transport: Transport,
    server: String,
}

impl HttpSlates {
    fn slate_url(&self, id: Option<&str>) -> String {
        match id {
            None => format!("{}/slate", self.server),
            Some(id) => format!("{}/slate/{}", self.server, id),
        }
    }
}

#[async_trait]
impl SlateDirectory for HttpSlates {
    async fn list_slates(&self) -> ApiResult<Vec<Slate>> {
        let url = self.slate_url(None);
        let response = self.transport.send(&url, self.transport.client.get(&url)).await?;
        let list: SlateList = response.json().await?;
        Ok(list.results)
    }

    async fn get_slate(&self, slate: &SlateRef) -> ApiResult<Slate> {
        let url = self.slate_url(Some(slate.id()));
        let response = self.transport.send(&url, self.transport.client.get(&url)).await?;
        Ok(response.json().await?)
    }
}

fn to_ballot_count(manage: &ManageResponse, quick_poll_open: bool) -> BallotCount {
    let received = if quick_poll_open {
        manage.quick_poll_count_ballots_received
    } else {
        manage.count_ballots_received
    };
    BallotCount {
        received,
        total_eligible: manage.num_users,
    }
}
