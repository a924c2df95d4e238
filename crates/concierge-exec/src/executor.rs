use async_trait::async_trait;
use concierge_core::prune_module_duplicates;
use concierge_core::Intent;
use concierge_core::Message;
use concierge_core::ModulePayload;
use concierge_core::ModuleType;
use concierge_core::OrderRef;
use concierge_core::ProductSummary;
use concierge_core::SessionPatch;
use serde_json::json;
use serde_json::Value;
use uuid::Uuid;

use crate::analytics::INTENT_COMPLETE;
use crate::analytics::INTENT_DETECTED;
use crate::analytics::INTENT_ERROR;
use crate::concierge::Concierge;
use crate::concierge::ProcessingGuard;
use crate::contracts::ExecuteRequest;
use crate::contracts::ExecuteResponse;
use crate::contracts::ExecutorError;
use crate::contracts::IntentExecutor;
use crate::contracts::IntentExtra;

pub const GENERIC_APOLOGY: &str =
    "Sorry, something went wrong on my side. Please try again in a moment.";

impl Concierge {
    /// Runs one intent end to end. Never fails: executor errors become a
    /// chat apology plus an `intent_error` event.
    pub async fn run_intent(&self, intent: Intent, extra: IntentExtra) {
        let request_id = Uuid::new_v4().to_string();
        let source = extra.source.unwrap_or_else(|| "direct".to_string());
        let payload = extra.payload.unwrap_or_else(|| json!({}));

        self.open();
        self.track(
            INTENT_DETECTED,
            json!({ "intent": intent.as_str(), "source": source, "requestId": request_id }),
        );
        tracing::info!(%intent, %request_id, %source, "running intent");

        let _processing = ProcessingGuard::acquire(self);
        let request = ExecuteRequest {
            intent,
            payload,
            state: self.state(),
            request_id: request_id.clone(),
        };
        let outcome = self
            .executor
            .execute(request)
            .await
            .and_then(|response| match response.error {
                Some(reported) => Err(ExecutorError::Reported(reported)),
                None => Ok(response),
            });

        match outcome {
            Ok(response) => {
                let appended = response.messages.len();
                self.apply_response(intent, response);
                tracing::info!(%intent, %request_id, appended, "intent complete");
                self.track(
                    INTENT_COMPLETE,
                    json!({
                        "intent": intent.as_str(),
                        "requestId": request_id,
                        "messages": appended,
                    }),
                );
            }
            Err(err) => {
                tracing::warn!(%intent, %request_id, error = %err, "intent failed");
                self.say(GENERIC_APOLOGY, Some(intent));
                self.track(
                    INTENT_ERROR,
                    json!({
                        "intent": intent.as_str(),
                        "requestId": request_id,
                        "error": err.to_string(),
                    }),
                );
            }
        }
    }

    fn apply_response(&self, intent: Intent, response: ExecuteResponse) {
        let patch = response
            .session_patch
            .unwrap_or_default()
            .merge(SessionPatch {
                last_intent: Some(Some(intent)),
                ..SessionPatch::default()
            });
        self.with_store(|store| {
            store.append_messages(response.messages);
            store.update_session(patch);
            let messages = &store.state().messages;
            let pruned = prune_module_duplicates(messages);
            if pruned.len() != messages.len() {
                tracing::debug!(
                    removed = messages.len() - pruned.len(),
                    "pruned superseded modules"
                );
                store.replace_messages(pruned);
            }
        });
    }
}

/// Deterministic stand-in for the storefront's intent handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedIntentExecutor;

#[async_trait]
impl IntentExecutor for SimulatedIntentExecutor {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, ExecutorError> {
        let intent = Some(request.intent);
        let response = match request.intent {
            Intent::FindProduct => {
                let filters = request
                    .payload
                    .get("filters")
                    .cloned()
                    .or_else(|| request.state.session.last_filters.clone())
                    .unwrap_or_else(|| json!({}));
                let items = search_catalog(&filters);
                let lead = if items.is_empty() {
                    "Nothing matches those filters yet. Try widening the price range."
                } else {
                    "Here are a few pieces that match."
                };
                let items = serde_json::to_value(&items)
                    .map_err(|err| ExecutorError::Failed(err.to_string()))?;
                ExecuteResponse {
                    messages: vec![
                        Message::concierge_text(lead, intent),
                        Message::concierge_module(
                            ModulePayload::new(ModuleType::ProductCarousel)
                                .with("filters", filters.clone())
                                .with("items", items),
                            intent,
                        ),
                    ],
                    session_patch: Some(SessionPatch {
                        last_filters: Some(Some(filters)),
                        ..SessionPatch::default()
                    }),
                    error: None,
                }
            }
            Intent::TrackOrder => {
                let order = order_from_payload(&request.payload)
                    .or_else(|| request.state.session.known_order().cloned());
                match order {
                    Some(order) => {
                        let label = order
                            .order_number
                            .clone()
                            .or_else(|| order.order_id.clone())
                            .unwrap_or_default();
                        ExecuteResponse {
                            messages: vec![Message::concierge_module(
                                ModulePayload::new(ModuleType::OrderTimeline)
                                    .with("orderNumber", label)
                                    .with("status", "processing")
                                    .with("offerTextUpdates", true),
                                intent,
                            )],
                            session_patch: Some(SessionPatch {
                                last_order: Some(Some(order)),
                                ..SessionPatch::default()
                            }),
                            error: None,
                        }
                    }
                    None => ExecuteResponse {
                        messages: vec![Message::concierge_module(
                            ModulePayload::new(ModuleType::OrderLookup).with(
                                "prompt",
                                "I can look that up. What's your order number and email?",
                            ),
                            intent,
                        )],
                        session_patch: None,
                        error: None,
                    },
                }
            }
            Intent::ReturnExchange => ExecuteResponse {
                messages: vec![Message::concierge_module(
                    ModulePayload::new(ModuleType::ReturnOptions).with(
                        "options",
                        json!(["refund", "exchange", "store-credit"]),
                    ),
                    intent,
                )],
                session_patch: None,
                error: None,
            },
            Intent::SizingRepairs => text_reply(
                "Rings can usually be resized within two sizes. Bring it to any studio or book a mail-in repair.",
                intent,
            ),
            Intent::CareWarranty => text_reply(
                "Warm water, mild soap and a soft brush keep most pieces bright. Every piece carries a lifetime warranty on manufacturing defects.",
                intent,
            ),
            Intent::Financing => text_reply(
                "You can split purchases over $250 into monthly payments at checkout.",
                intent,
            ),
            Intent::StylistContact => ExecuteResponse {
                messages: vec![Message::concierge_module(
                    ModulePayload::new(ModuleType::Escalation)
                        .with("channels", json!(["chat", "phone", "appointment"])),
                    intent,
                )],
                session_patch: None,
                error: None,
            },
            Intent::Csat => {
                let message = if request.payload.get("rating").is_some() {
                    Message::concierge_text("Thanks for the feedback!", intent)
                } else {
                    Message::concierge_module(
                        ModulePayload::new(ModuleType::Csat).with("scale", 5),
                        intent,
                    )
                };
                ExecuteResponse {
                    messages: vec![message],
                    session_patch: Some(SessionPatch {
                        has_shown_csat: Some(true),
                        ..SessionPatch::default()
                    }),
                    error: None,
                }
            }
        };
        Ok(response)
    }
}

fn text_reply(text: &str, intent: Option<Intent>) -> ExecuteResponse {
    ExecuteResponse {
        messages: vec![Message::concierge_text(text, intent)],
        session_patch: None,
        error: None,
    }
}

fn order_from_payload(payload: &Value) -> Option<OrderRef> {
    let field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let order = OrderRef {
        order_id: field("orderId"),
        order_number: field("orderNumber"),
    };
    order.is_known().then_some(order)
}

struct CatalogEntry {
    id: &'static str,
    title: &'static str,
    slug: &'static str,
    price: f64,
    metal: &'static str,
    category: &'static str,
    ready_to_ship: bool,
}

const CATALOG: [CatalogEntry; 6] = [
    CatalogEntry {
        id: "p-100",
        title: "Solitaire Engagement Ring",
        slug: "solitaire-engagement-ring",
        price: 1850.0,
        metal: "platinum",
        category: "rings",
        ready_to_ship: true,
    },
    CatalogEntry {
        id: "p-101",
        title: "Pavé Band",
        slug: "pave-band",
        price: 640.0,
        metal: "white gold",
        category: "rings",
        ready_to_ship: true,
    },
    CatalogEntry {
        id: "p-102",
        title: "Signet Ring",
        slug: "signet-ring",
        price: 420.0,
        metal: "yellow gold",
        category: "rings",
        ready_to_ship: false,
    },
    CatalogEntry {
        id: "p-200",
        title: "Tennis Bracelet",
        slug: "tennis-bracelet",
        price: 2400.0,
        metal: "white gold",
        category: "bracelets",
        ready_to_ship: true,
    },
    CatalogEntry {
        id: "p-300",
        title: "Pearl Drop Earrings",
        slug: "pearl-drop-earrings",
        price: 310.0,
        metal: "silver",
        category: "earrings",
        ready_to_ship: true,
    },
    CatalogEntry {
        id: "p-400",
        title: "Bezel Pendant",
        slug: "bezel-pendant",
        price: 780.0,
        metal: "rose gold",
        category: "pendants",
        ready_to_ship: false,
    },
];

fn search_catalog(filters: &Value) -> Vec<ProductSummary> {
    let text = |key: &str| filters.get(key).and_then(Value::as_str);
    let number = |key: &str| filters.get(key).and_then(Value::as_f64);
    CATALOG
        .iter()
        .filter(|entry| number("maxPrice").map_or(true, |max| entry.price <= max))
        .filter(|entry| number("minPrice").map_or(true, |min| entry.price >= min))
        .filter(|entry| {
            text("metal").map_or(true, |metal| entry.metal == metal || entry.metal.ends_with(metal))
        })
        .filter(|entry| text("category").map_or(true, |category| entry.category == category))
        .filter(|entry| text("availability") != Some("ready-to-ship") || entry.ready_to_ship)
        .map(|entry| ProductSummary {
            id: entry.id.to_string(),
            title: entry.title.to_string(),
            slug: Some(entry.slug.to_string()),
            price: entry.price,
            description: None,
            shipping_promise: entry
                .ready_to_ship
                .then(|| "Ships in 1-2 business days".to_string()),
        })
        .collect()
}
