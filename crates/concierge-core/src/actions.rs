use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::state::Intent;
use super::state::Message;
use super::state::ProductSummary;
use super::state::SessionPatch;

/// Every transition the widget store accepts.
#[derive(Debug, Clone)]
pub enum WidgetAction {
    Open,
    Close,
    Toggle,
    AppendMessages(Vec<Message>),
    ReplaceMessages(Vec<Message>),
    UpdateSession(SessionPatch),
    SetProcessing(bool),
    Reset { session_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLookup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOption {
    pub option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsatResponse {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

/// Actions raised by rendered modules, received as `{type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ModuleAction {
    SubmitProductFilters(Value),
    #[serde(rename = "filter_change")]
    FilterChange(Value),
    SubmitOrderLookup(OrderLookup),
    SubmitReturnOption(ReturnOption),
    SubmitEscalation(EscalationRequest),
    SubmitCsat(CsatResponse),
    ViewProduct {
        slug: String,
    },
    AddToCart {
        slug: String,
        #[serde(default = "default_quantity")]
        quantity: u32,
    },
    TextUpdates,
    ShortlistAdd {
        product: ProductSummary,
    },
    ShortlistRemove {
        id: String,
    },
    ShortlistClear,
    ShortlistShare,
    ShortlistCheckout,
    IntentChooserSelect {
        intent: Intent,
        #[serde(default)]
        payload: Option<Value>,
    },
    RequestHuman,
}

impl ModuleAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubmitProductFilters(_) => "submit-product-filters",
            Self::FilterChange(_) => "filter_change",
            Self::SubmitOrderLookup(_) => "submit-order-lookup",
            Self::SubmitReturnOption(_) => "submit-return-option",
            Self::SubmitEscalation(_) => "submit-escalation",
            Self::SubmitCsat(_) => "submit-csat",
            Self::ViewProduct { .. } => "view-product",
            Self::AddToCart { .. } => "add-to-cart",
            Self::TextUpdates => "text-updates",
            Self::ShortlistAdd { .. } => "shortlist-add",
            Self::ShortlistRemove { .. } => "shortlist-remove",
            Self::ShortlistClear => "shortlist-clear",
            Self::ShortlistShare => "shortlist-share",
            Self::ShortlistCheckout => "shortlist-checkout",
            Self::IntentChooserSelect { .. } => "intent-chooser-select",
            Self::RequestHuman => "request-human",
        }
    }
}
