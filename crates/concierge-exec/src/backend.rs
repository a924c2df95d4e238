use std::time::Duration;

use async_trait::async_trait;
use concierge_core::config::BackendConfig;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::contracts::OrderUpdatesReply;
use crate::contracts::OrderUpdatesRequest;
use crate::contracts::ShortlistSync;
use crate::contracts::SupportBackend;

pub const SHORTLIST_PATH: &str = "/api/support/shortlist";
pub const ORDER_UPDATES_PATH: &str = "/api/support/order-updates";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("support backend is not configured")]
    Unavailable,
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend responded with status {0}")]
    Status(u16),
    #[error("backend reply could not be decoded: {0}")]
    Decode(String),
}

/// Talks to the storefront's support endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSupportBackend {
    client: Client,
    base: Url,
}

impl HttpSupportBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let base = Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// `Ok(None)` when no base url is configured.
    pub fn from_config(config: &BackendConfig) -> Result<Option<Self>, BackendError> {
        match config.base_url.as_deref() {
            Some(base_url) if !base_url.trim().is_empty() => Ok(Some(Self::new(
                base_url.trim(),
                Duration::from_millis(config.timeout_ms),
            )?)),
            _ => Ok(None),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        request_id: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, %request_id, "posting to support backend");
        let response = self
            .client
            .post(url)
            .header(REQUEST_ID_HEADER, request_id)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl SupportBackend for HttpSupportBackend {
    async fn sync_shortlist(
        &self,
        request: &ShortlistSync,
        request_id: &str,
    ) -> Result<(), BackendError> {
        self.post(SHORTLIST_PATH, request, request_id).await?;
        Ok(())
    }

    async fn subscribe_order_updates(
        &self,
        request: &OrderUpdatesRequest,
        request_id: &str,
    ) -> Result<OrderUpdatesReply, BackendError> {
        let response = self.post(ORDER_UPDATES_PATH, request, request_id).await?;
        let body = response.text().await?;
        decode_order_reply(&body)
    }
}

fn decode_order_reply(body: &str) -> Result<OrderUpdatesReply, BackendError> {
    if body.trim().is_empty() {
        return Ok(OrderUpdatesReply::default());
    }
    serde_json::from_str(body).map_err(|err| BackendError::Decode(err.to_string()))
}

/// Used when no backend is configured; every call fails as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

#[async_trait]
impl SupportBackend for OfflineBackend {
    async fn sync_shortlist(
        &self,
        _request: &ShortlistSync,
        _request_id: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unavailable)
    }

    async fn subscribe_order_updates(
        &self,
        _request: &OrderUpdatesRequest,
        _request_id: &str,
    ) -> Result<OrderUpdatesReply, BackendError> {
        Err(BackendError::Unavailable)
    }
}
