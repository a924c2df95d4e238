use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FindProduct,
    TrackOrder,
    ReturnExchange,
    SizingRepairs,
    CareWarranty,
    Financing,
    StylistContact,
    Csat,
}

impl Intent {
    /// Declaration order doubles as the classifier's tie-break order.
    pub const ALL: [Intent; 8] = [
        Intent::FindProduct,
        Intent::TrackOrder,
        Intent::ReturnExchange,
        Intent::SizingRepairs,
        Intent::CareWarranty,
        Intent::Financing,
        Intent::StylistContact,
        Intent::Csat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FindProduct => "find_product",
            Self::TrackOrder => "track_order",
            Self::ReturnExchange => "return_exchange",
            Self::SizingRepairs => "sizing_repairs",
            Self::CareWarranty => "care_warranty",
            Self::Financing => "financing",
            Self::StylistContact => "stylist_contact",
            Self::Csat => "csat",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FindProduct => "Find a piece",
            Self::TrackOrder => "Track an order",
            Self::ReturnExchange => "Returns & exchanges",
            Self::SizingRepairs => "Sizing & repairs",
            Self::CareWarranty => "Care & warranty",
            Self::Financing => "Financing",
            Self::StylistContact => "Talk to a stylist",
            Self::Csat => "Rate this chat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == value)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Concierge,
}

/// Discriminator of a structured chat module. Unknown tags survive a
/// hydrate/persist cycle untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModuleType {
    ProductCarousel,
    ShortlistPanel,
    IntentChooser,
    OrderTimeline,
    ProductFilters,
    OrderLookup,
    ReturnOptions,
    Escalation,
    Csat,
    ShareFallback,
    Other(String),
}

impl ModuleType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ProductCarousel => "product-carousel",
            Self::ShortlistPanel => "shortlist-panel",
            Self::IntentChooser => "intent-chooser",
            Self::OrderTimeline => "order-timeline",
            Self::ProductFilters => "product-filters",
            Self::OrderLookup => "order-lookup",
            Self::ReturnOptions => "return-options",
            Self::Escalation => "escalation",
            Self::Csat => "csat",
            Self::ShareFallback => "share-fallback",
            Self::Other(tag) => tag.as_str(),
        }
    }
}

impl From<String> for ModuleType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "product-carousel" => Self::ProductCarousel,
            "shortlist-panel" => Self::ShortlistPanel,
            "intent-chooser" => Self::IntentChooser,
            "order-timeline" => Self::OrderTimeline,
            "product-filters" => Self::ProductFilters,
            "order-lookup" => Self::OrderLookup,
            "return-options" => Self::ReturnOptions,
            "escalation" => Self::Escalation,
            "csat" => Self::Csat,
            "share-fallback" => Self::ShareFallback,
            _ => Self::Other(tag),
        }
    }
}

impl From<ModuleType> for String {
    fn from(module_type: ModuleType) -> Self {
        match module_type {
            ModuleType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePayload {
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ModulePayload {
    pub fn new(module_type: ModuleType) -> Self {
        Self {
            module_type,
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn shortlist_panel(items: &[ProductSummary]) -> Self {
        let items = serde_json::to_value(items).unwrap_or(Value::Array(Vec::new()));
        Self::new(ModuleType::ShortlistPanel).with("items", items)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum MessageBody {
    Text(String),
    Module(ModulePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, body: MessageBody, intent: Option<Intent>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            body,
            intent,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn guest_text(text: impl Into<String>) -> Self {
        Self::new(Role::Guest, MessageBody::Text(text.into()), None)
    }

    pub fn concierge_text(text: impl Into<String>, intent: Option<Intent>) -> Self {
        Self::new(Role::Concierge, MessageBody::Text(text.into()), intent)
    }

    pub fn concierge_module(payload: ModulePayload, intent: Option<Intent>) -> Self {
        Self::new(Role::Concierge, MessageBody::Module(payload), intent)
    }

    pub fn module_type(&self) -> Option<&ModuleType> {
        match &self.body {
            MessageBody::Module(payload) => Some(&payload.module_type),
            MessageBody::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text.as_str()),
            MessageBody::Module(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_promise: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
}

impl OrderRef {
    pub fn is_known(&self) -> bool {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|value| !value.trim().is_empty())
        };
        present(&self.order_id) || present(&self.order_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub shortlist: Vec<ProductSummary>,
    pub last_filters: Option<Value>,
    pub last_order: Option<OrderRef>,
    pub last_intent: Option<Intent>,
    pub intro_dismissed_at: Option<i64>,
    pub has_shown_csat: bool,
    pub last_active: i64,
    /// Set when the backend has not acknowledged the current shortlist.
    #[serde(default)]
    pub shortlist_sync_pending: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            shortlist: Vec::new(),
            last_filters: None,
            last_order: None,
            last_intent: None,
            intro_dismissed_at: None,
            has_shown_csat: false,
            last_active: now_ms,
            shortlist_sync_pending: false,
        }
    }

    pub fn fresh() -> Self {
        Self::new(new_session_id(), chrono::Utc::now().timestamp_millis())
    }

    pub fn known_order(&self) -> Option<&OrderRef> {
        self.last_order.as_ref().filter(|order| order.is_known())
    }

    pub fn shortlist_contains(&self, product_id: &str) -> bool {
        self.shortlist.iter().any(|item| item.id == product_id)
    }
}

pub fn new_session_id() -> String {
    format!("sess-{}", Uuid::new_v4())
}

/// Partial session update. Nullable fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub shortlist: Option<Vec<ProductSummary>>,
    pub last_filters: Option<Option<Value>>,
    pub last_order: Option<Option<OrderRef>>,
    pub last_intent: Option<Option<Intent>>,
    pub intro_dismissed_at: Option<Option<i64>>,
    pub has_shown_csat: Option<bool>,
    pub shortlist_sync_pending: Option<bool>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fields set in `other` win.
    pub fn merge(mut self, other: SessionPatch) -> Self {
        if other.shortlist.is_some() {
            self.shortlist = other.shortlist;
        }
        if other.last_filters.is_some() {
            self.last_filters = other.last_filters;
        }
        if other.last_order.is_some() {
            self.last_order = other.last_order;
        }
        if other.last_intent.is_some() {
            self.last_intent = other.last_intent;
        }
        if other.intro_dismissed_at.is_some() {
            self.intro_dismissed_at = other.intro_dismissed_at;
        }
        if other.has_shown_csat.is_some() {
            self.has_shown_csat = other.has_shown_csat;
        }
        if other.shortlist_sync_pending.is_some() {
            self.shortlist_sync_pending = other.shortlist_sync_pending;
        }
        self
    }

    pub fn apply(self, session: &mut Session) {
        if let Some(shortlist) = self.shortlist {
            session.shortlist = dedupe_shortlist(shortlist);
        }
        if let Some(last_filters) = self.last_filters {
            session.last_filters = last_filters;
        }
        if let Some(last_order) = self.last_order {
            session.last_order = last_order;
        }
        if let Some(last_intent) = self.last_intent {
            session.last_intent = last_intent;
        }
        if let Some(intro_dismissed_at) = self.intro_dismissed_at {
            session.intro_dismissed_at = intro_dismissed_at;
        }
        if let Some(has_shown_csat) = self.has_shown_csat {
            session.has_shown_csat = has_shown_csat;
        }
        if let Some(pending) = self.shortlist_sync_pending {
            session.shortlist_sync_pending = pending;
        }
    }
}

/// Keeps the last entry for each id at the position of its first occurrence.
pub fn dedupe_shortlist(items: Vec<ProductSummary>) -> Vec<ProductSummary> {
    let mut out: Vec<ProductSummary> = Vec::with_capacity(items.len());
    for item in items {
        match out.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => out.push(item),
        }
    }
    out
}

/// Merge-by-id insert used by the shortlist add path.
pub fn merge_into_shortlist(
    shortlist: &[ProductSummary],
    product: ProductSummary,
) -> Vec<ProductSummary> {
    let mut items = shortlist.to_vec();
    items.push(product);
    dedupe_shortlist(items)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetState {
    pub is_open: bool,
    pub is_processing: bool,
    pub messages: Vec<Message>,
    pub session: Session,
    /// Number of intent executions and shortlist calls currently awaiting.
    pub in_flight: u32,
}

impl WidgetState {
    pub fn new(session: Session) -> Self {
        Self {
            is_open: false,
            is_processing: false,
            messages: Vec::new(),
            session,
            in_flight: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn product(id: &str, title: &str) -> ProductSummary {
        ProductSummary {
            id: id.to_string(),
            title: title.to_string(),
            slug: None,
            price: 500.0,
            description: None,
            shipping_promise: None,
        }
    }

    #[test]
    fn message_serializes_with_type_and_payload_keys() {
        let message = Message::concierge_text("hello", Some(Intent::TrackOrder));
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["type"], json!("text"));
        assert_eq!(value["payload"], json!("hello"));
        assert_eq!(value["role"], json!("concierge"));
        assert_eq!(value["intent"], json!("track_order"));
    }

    #[test]
    fn module_message_keeps_unknown_fields_and_tags() {
        let raw = json!({
            "id": "m1",
            "role": "concierge",
            "type": "module",
            "payload": { "type": "gift-wrap", "ribbon": "gold" },
            "timestamp": 1
        });
        let message: Message = serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(
            message.module_type(),
            Some(&ModuleType::Other("gift-wrap".to_string()))
        );
        assert_eq!(serde_json::to_value(&message).expect("serialize"), raw);
    }

    #[test]
    fn dedupe_keeps_first_position_and_latest_data() {
        let mut updated = product("p1", "Ring A v2");
        updated.price = 650.0;
        let items = dedupe_shortlist(vec![
            product("p1", "Ring A"),
            product("p2", "Necklace"),
            updated.clone(),
        ]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], updated);
        assert_eq!(items[1].id, "p2");
    }

    #[test]
    fn order_ref_requires_a_non_blank_identifier() {
        assert!(!OrderRef::default().is_known());
        assert!(!OrderRef {
            order_id: Some("  ".to_string()),
            order_number: None,
        }
        .is_known());
        assert!(OrderRef {
            order_id: None,
            order_number: Some("1042".to_string()),
        }
        .is_known());
    }

    #[test]
    fn patch_merge_prefers_later_fields() {
        let first = SessionPatch {
            has_shown_csat: Some(false),
            last_intent: Some(Some(Intent::Csat)),
            ..SessionPatch::default()
        };
        let second = SessionPatch {
            last_intent: Some(Some(Intent::TrackOrder)),
            ..SessionPatch::default()
        };
        let merged = first.merge(second);
        assert_eq!(merged.has_shown_csat, Some(false));
        assert_eq!(merged.last_intent, Some(Some(Intent::TrackOrder)));
    }
}
