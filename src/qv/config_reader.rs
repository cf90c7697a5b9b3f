use crate::qv::*;

use std::fs;
use std::time::Duration;

use quickvote::PollingConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "qvadmin.json";
pub const DEFAULT_SERVER: &str = "https://quickvote.voter-science.com";
pub const DEFAULT_SLATE_SERVER: &str = "https://trc-login.voter-science.com";
pub const AUTH_TOKEN_ENV: &str = "QV_AUTH_TOKEN";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Base URL of the QuickVote server.
    #[serde(default = "default_server")]
    pub server: String,
    /// Base URL of the slate directory.
    #[serde(rename = "slateServer", default = "default_slate_server")]
    pub slate_server: String,
    #[serde(rename = "sheetId")]
    pub sheet_id: String,
    #[serde(rename = "authToken")]
    pub auth_token: Option<String>,
    #[serde(rename = "pollIntervalSecs")]
    pub poll_interval_secs: Option<u64>,
    #[serde(rename = "requestTimeoutSecs")]
    pub request_timeout_secs: Option<u64>,
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_slate_server() -> String {
    DEFAULT_SLATE_SERVER.to_string()
}

impl AdminConfig {
    pub fn polling_config(&self) -> PollingConfig {
        match self.poll_interval_secs {
            Some(secs) if secs > 0 => PollingConfig {
                interval: Duration::from_secs(secs),
            },
            _ => PollingConfig::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// The token from the file, or else from the environment.
    pub fn auth_token(&self) -> Option<String> {
        self.auth_token
            .clone()
            .or_else(|| std::env::var(AUTH_TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
    }

    /// The trailing part of the sheet id, used by the ballot count endpoint.
    pub fn short_id(&self) -> &str {
        self.sheet_id.get(3..).unwrap_or("")
    }
}

pub fn parse_config(contents: &str, path: &str) -> QvResult<AdminConfig> {
    let config: AdminConfig =
        serde_json::from_str(contents).context(ParsingConfigSnafu { path })?;
    if config.sheet_id.trim().is_empty() {
        whatever!("The configuration {} does not set a sheetId", path)
    }
    Ok(config)
}

pub fn read_config(path: &str) -> QvResult<AdminConfig> {
    let contents = fs::read_to_string(path).context(OpeningConfigSnafu { path })?;
    let config = parse_config(&contents, path)?;
    debug!("config: {} sheet {}", config.server, config.sheet_id);
    Ok(config)
}
