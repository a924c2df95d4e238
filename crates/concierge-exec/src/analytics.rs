use serde_json::Value;

use crate::contracts::Analytics;

pub const INTENT_DETECTED: &str = "intent_detected";
pub const INTENT_COMPLETE: &str = "intent_complete";
pub const INTENT_ERROR: &str = "intent_error";
pub const INTENT_DISAMBIGUATION: &str = "intent_disambiguation";
pub const PRECONDITION_FAILED: &str = "precondition_failed";
pub const SHORTLIST_SYNC_FAILED: &str = "shortlist_sync_failed";
pub const SHORTLIST_SHARED: &str = "shortlist_shared";
pub const SHORTLIST_CHECKOUT: &str = "shortlist_checkout";
pub const ORDER_UPDATES_FAILED: &str = "order_updates_failed";
pub const CART_ADD_FAILED: &str = "cart_add_failed";
pub const HOST_ACTION_FAILED: &str = "host_action_failed";

/// Emits every event as a structured log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

impl Analytics for TracingAnalytics {
    fn track(&self, event: &str, properties: Value) {
        tracing::info!(target: "concierge::analytics", event, properties = %properties, "track");
    }
}
