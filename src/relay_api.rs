//! REST side of the relay server: session validation and host liveness.

use crate::error::{HostError, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn validate_session(&self, session_id: &str) -> Result<bool>;
    async fn report_host_status(&self, session_id: &str, online: bool) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    valid: bool,
}

#[derive(Debug, Serialize)]
struct HostStatusRequest {
    online: bool,
}

pub struct HttpRelayApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRelayApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| HostError::Config(format!("invalid relay api url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(HostError::Config(format!(
                "relay api url {base_url} cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// `{base}/sessions/{id}` followed by `extra`, each segment percent-encoded.
    fn endpoint(&self, session_id: &str, extra: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("sessions")
                .push(session_id)
                .extend(extra);
        }
        url
    }

    pub fn session_url(&self, session_id: &str) -> Url {
        self.endpoint(session_id, &[])
    }

    pub fn host_status_url(&self, session_id: &str) -> Url {
        self.endpoint(session_id, &["host-status"])
    }
}

#[async_trait]
impl RelayApi for HttpRelayApi {
    async fn validate_session(&self, session_id: &str) -> Result<bool> {
        let resp = self.client.get(self.session_url(session_id)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(session_id, "Session not found on relay");
            return Ok(false);
        }
        let body: ValidateResponse = resp.error_for_status()?.json().await?;
        Ok(body.valid)
    }

    async fn report_host_status(&self, session_id: &str, online: bool) -> Result<()> {
        self.client
            .post(self.host_status_url(session_id))
            .json(&HostStatusRequest { online })
            .send()
            .await?
            .error_for_status()?;
        debug!(session_id, online, "Host status reported");
        Ok(())
    }
}
