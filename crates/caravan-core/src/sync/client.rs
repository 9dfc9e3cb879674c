//! HTTP client for the peer sync endpoints

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ChangeRecord;

#[derive(Debug, Error)]
pub enum SyncClientError {
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Sync API error: {0}")]
    Api(String),
}

pub type SyncClientResult<T> = Result<T, SyncClientError>;

#[derive(Debug, Deserialize)]
struct PullResponse {
    changes: Vec<ChangeRecord>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    changes: &'a [ChangeRecord],
}

/// Client for another replica's sync API
#[derive(Clone)]
pub struct SyncClient {
    base_url: String,
    client: reqwest::Client,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> SyncClientResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    /// The normalized peer URL, also used as the pull cursor key
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch changes the peer recorded after the given feed sequence
    pub async fn pull(&self, after_sequence: i64) -> SyncClientResult<Vec<ChangeRecord>> {
        let response = self
            .client
            .get(format!("{}/sync/pull", self.base_url))
            .query(&[("after_clock", after_sequence)])
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncClientError::Api(parse_api_error(status, &body)));
        }

        let payload = response.json::<PullResponse>().await?;
        Ok(payload.changes)
    }

    /// Send local changes to the peer for application
    pub async fn push(&self, changes: &[ChangeRecord]) -> SyncClientResult<()> {
        let response = self
            .client
            .post(format!("{}/sync/push", self.base_url))
            .json(&PushRequest { changes })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncClientError::Api(parse_api_error(status, &body)));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SyncErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SyncErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> SyncClientResult<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(SyncClientError::InvalidConfiguration(
            "peer URL must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(SyncClientError::InvalidConfiguration(
            "peer URL must include http:// or https://".to_string(),
        ))
    }
}
