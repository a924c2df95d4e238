use async_trait::async_trait;
use concierge_core::Intent;
use concierge_core::Message;
use concierge_core::ProductSummary;
use concierge_core::SessionPatch;
use concierge_core::WidgetState;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::backend::BackendError;

/// Input handed to the per-intent business logic.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub intent: Intent,
    pub payload: Value,
    pub state: WidgetState,
    pub request_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteResponse {
    pub messages: Vec<Message>,
    pub session_patch: Option<SessionPatch>,
    /// Set when the handler completed but wants the turn treated as failed.
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("intent handler failed: {0}")]
    Failed(String),
    #[error("intent handler reported: {0}")]
    Reported(String),
}

#[async_trait]
pub trait IntentExecutor: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, ExecutorError>;
}

#[async_trait]
pub trait CartClient: Send + Sync {
    async fn add_item(&self, slug: &str, quantity: u32) -> bool;
}

/// Fire-and-forget event sink. Implementations swallow their own failures.
pub trait Analytics: Send + Sync {
    fn track(&self, event: &str, properties: Value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTarget {
    SameTab,
    NewTab,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host does not support {0}")]
    Unsupported(&'static str),
    #[error("host action failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareContent {
    pub title: String,
    pub text: String,
    pub url: String,
}

/// What the embedding page can do on the concierge's behalf.
#[async_trait]
pub trait HostBridge: Send + Sync {
    fn open_url(&self, url: &str, target: OpenTarget) -> Result<(), HostError>;
    async fn confirm(&self, prompt: &str) -> bool;
    async fn native_share(&self, content: &ShareContent) -> Result<(), HostError>;
    async fn copy_to_clipboard(&self, text: &str) -> Result<(), HostError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistSync {
    pub session_id: String,
    pub items: Vec<ProductSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdatesRequest {
    pub session_id: String,
    pub origin_intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdatesReply {
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait SupportBackend: Send + Sync {
    /// Full-replace sync of the session's shortlist.
    async fn sync_shortlist(
        &self,
        request: &ShortlistSync,
        request_id: &str,
    ) -> Result<(), BackendError>;

    async fn subscribe_order_updates(
        &self,
        request: &OrderUpdatesRequest,
        request_id: &str,
    ) -> Result<OrderUpdatesReply, BackendError>;
}

/// Optional context for a direct intent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentExtra {
    pub payload: Option<Value>,
    pub source: Option<String>,
}

impl IntentExtra {
    pub fn new(payload: Value, source: impl Into<String>) -> Self {
        Self {
            payload: Some(payload),
            source: Some(source.into()),
        }
    }

    pub fn source(source: impl Into<String>) -> Self {
        Self {
            payload: None,
            source: Some(source.into()),
        }
    }
}
