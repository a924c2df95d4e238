use concierge_core::actions::CsatResponse;
use concierge_core::actions::OrderLookup;
use concierge_core::actions::ReturnOption;
use concierge_core::disambiguation::chooser_default_payload;
use concierge_core::disambiguation::MissTracker;
use concierge_core::Intent;
use concierge_core::ModuleAction;
use concierge_core::OrderRef;
use concierge_core::SessionPatch;
use serde_json::json;
use serde_json::Value;
use uuid::Uuid;

use crate::analytics::CART_ADD_FAILED;
use crate::analytics::HOST_ACTION_FAILED;
use crate::analytics::ORDER_UPDATES_FAILED;
use crate::analytics::PRECONDITION_FAILED;
use crate::concierge::Concierge;
use crate::contracts::IntentExtra;
use crate::contracts::OpenTarget;
use crate::contracts::OrderUpdatesRequest;

pub const RETURN_NEEDS_ORDER: &str =
    "To start a return I need to find your order first. Share your order number and email and I'll pull it up.";
const ORDER_UPDATES_DEFAULT: &str =
    "You're set. We'll text you whenever your order status changes.";
const ORDER_UPDATES_APOLOGY: &str =
    "Sorry, I couldn't turn on text updates right now. Please try again shortly.";
const ORDER_UPDATES_NEEDS_ORDER: &str =
    "I need an order number before I can send updates. Track your order first and I'll offer it again.";
const PRODUCT_OPEN_APOLOGY: &str = "Sorry, I couldn't open that product page.";

impl Concierge {
    pub async fn handle_module_action(&self, action: ModuleAction, origin_intent: Option<Intent>) {
        tracing::debug!(action = action.kind(), origin = ?origin_intent, "module action");
        match action {
            ModuleAction::SubmitProductFilters(filters) => {
                self.search_with_filters(filters, "product-filters").await;
            }
            ModuleAction::FilterChange(filters) => {
                self.search_with_filters(filters, "filter-change").await;
            }
            ModuleAction::SubmitOrderLookup(lookup) => self.submit_order_lookup(lookup).await,
            ModuleAction::SubmitReturnOption(option) => self.submit_return_option(option).await,
            ModuleAction::SubmitEscalation(request) => {
                let payload = serde_json::to_value(&request).unwrap_or_else(|_| json!({}));
                self.run_intent(
                    Intent::StylistContact,
                    IntentExtra::new(payload, "escalation"),
                )
                .await;
            }
            ModuleAction::SubmitCsat(response) => self.submit_csat(response).await,
            ModuleAction::ViewProduct { slug } => {
                let url = self.storefront.product_url(&slug);
                if let Err(err) = self.host.open_url(&url, OpenTarget::SameTab) {
                    tracing::warn!(%url, error = %err, "could not open product page");
                    self.say(PRODUCT_OPEN_APOLOGY, origin_intent);
                    self.track(
                        HOST_ACTION_FAILED,
                        json!({ "action": "view-product", "error": err.to_string() }),
                    );
                }
            }
            ModuleAction::AddToCart { slug, quantity } => {
                let added = self.cart.add_item(&slug, quantity).await;
                if added {
                    self.say("Added to your bag.", origin_intent);
                } else {
                    tracing::warn!(%slug, quantity, "cart rejected item");
                    self.say(
                        "Sorry, I couldn't add that to your bag. Please try again from the product page.",
                        origin_intent,
                    );
                    self.track(
                        CART_ADD_FAILED,
                        json!({ "slug": slug, "quantity": quantity }),
                    );
                }
            }
            ModuleAction::TextUpdates => self.subscribe_order_updates(origin_intent).await,
            ModuleAction::ShortlistAdd { product } => self.shortlist_add(product).await,
            ModuleAction::ShortlistRemove { id } => self.shortlist_remove(&id).await,
            ModuleAction::ShortlistClear => self.shortlist_clear().await,
            ModuleAction::ShortlistShare => self.shortlist_share().await,
            ModuleAction::ShortlistCheckout => self.shortlist_checkout().await,
            ModuleAction::IntentChooserSelect { intent, payload } => {
                self.with_misses(MissTracker::reset);
                let payload = payload
                    .filter(|payload| !is_empty_payload(payload))
                    .unwrap_or_else(|| chooser_default_payload(intent));
                self.run_intent(intent, IntentExtra::new(payload, "intent-chooser"))
                    .await;
            }
            ModuleAction::RequestHuman => {
                self.with_misses(MissTracker::reset);
                self.run_intent(
                    Intent::StylistContact,
                    IntentExtra::new(json!({ "reason": "requested" }), "intent-chooser"),
                )
                .await;
            }
        }
    }

    async fn search_with_filters(&self, filters: Value, source: &str) {
        self.with_store(|store| {
            store.update_session(SessionPatch {
                last_filters: Some(Some(filters.clone())),
                ..SessionPatch::default()
            })
        });
        self.run_intent(
            Intent::FindProduct,
            IntentExtra::new(json!({ "filters": filters }), source),
        )
        .await;
    }

    async fn submit_order_lookup(&self, lookup: OrderLookup) {
        let order = OrderRef {
            order_id: lookup.order_id.clone(),
            order_number: lookup.order_number.clone(),
        };
        if order.is_known() {
            self.with_store(|store| {
                store.update_session(SessionPatch {
                    last_order: Some(Some(order)),
                    ..SessionPatch::default()
                })
            });
        }
        let payload = serde_json::to_value(&lookup).unwrap_or_else(|_| json!({}));
        self.run_intent(Intent::TrackOrder, IntentExtra::new(payload, "order-lookup"))
            .await;
    }

    async fn submit_return_option(&self, option: ReturnOption) {
        let known_order = self.with_store(|store| store.state().session.known_order().cloned());
        let Some(order) = known_order else {
            tracing::info!("return option submitted without a known order");
            self.say(RETURN_NEEDS_ORDER, Some(Intent::ReturnExchange));
            self.track(
                PRECONDITION_FAILED,
                json!({ "action": "submit-return-option", "reason": "missing_order" }),
            );
            return;
        };
        let payload = json!({
            "option": option.option,
            "reason": option.reason,
            "orderId": order.order_id,
            "orderNumber": order.order_number,
        });
        self.run_intent(
            Intent::ReturnExchange,
            IntentExtra::new(payload, "return-options"),
        )
        .await;
    }

    async fn submit_csat(&self, response: CsatResponse) {
        self.with_store(|store| {
            store.update_session(SessionPatch {
                has_shown_csat: Some(true),
                ..SessionPatch::default()
            })
        });
        let payload = serde_json::to_value(&response).unwrap_or_else(|_| json!({}));
        self.run_intent(Intent::Csat, IntentExtra::new(payload, "csat"))
            .await;
    }

    async fn subscribe_order_updates(&self, origin_intent: Option<Intent>) {
        let (session_id, order) = self.with_store(|store| {
            let session = &store.state().session;
            (session.id.clone(), session.known_order().cloned())
        });
        let Some(order) = order else {
            self.say(ORDER_UPDATES_NEEDS_ORDER, origin_intent);
            self.track(
                PRECONDITION_FAILED,
                json!({ "action": "text-updates", "reason": "missing_order" }),
            );
            return;
        };

        let request_id = Uuid::new_v4().to_string();
        let request = OrderUpdatesRequest {
            session_id,
            origin_intent,
            order_id: order.order_id,
            order_number: order.order_number,
        };
        match self
            .backend
            .subscribe_order_updates(&request, &request_id)
            .await
        {
            Ok(reply) => {
                let message = reply
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| ORDER_UPDATES_DEFAULT.to_string());
                self.say(message, origin_intent);
            }
            Err(err) => {
                tracing::warn!(%request_id, error = %err, "order updates subscription failed");
                self.say(ORDER_UPDATES_APOLOGY, origin_intent);
                self.track(
                    ORDER_UPDATES_FAILED,
                    json!({ "requestId": request_id, "error": err.to_string() }),
                );
            }
        }
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use concierge_core::ProductSummary;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::harness;
    use crate::test_support::Harness;

    fn action(raw: Value) -> ModuleAction {
        serde_json::from_value(raw).expect("module action")
    }

    #[tokio::test]
    async fn return_option_without_order_is_refused() {
        let Harness {
            concierge,
            executor,
            analytics,
            ..
        } = harness();

        concierge
            .handle_module_action(
                action(json!({ "type": "submit-return-option", "data": { "option": "refund" } })),
                Some(Intent::ReturnExchange),
            )
            .await;

        assert!(executor.calls().is_empty());
        let state = concierge.state();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].text(), Some(RETURN_NEEDS_ORDER));
        assert_eq!(analytics.events_named("precondition_failed").len(), 1);
    }

    #[tokio::test]
    async fn return_option_after_lookup_runs_return_exchange() {
        let Harness {
            concierge,
            executor,
            ..
        } = harness();

        concierge
            .handle_module_action(
                action(json!({
                    "type": "submit-order-lookup",
                    "data": { "orderNumber": "1042", "email": "jo@example.com" }
                })),
                Some(Intent::TrackOrder),
            )
            .await;
        concierge
            .handle_module_action(
                action(json!({ "type": "submit-return-option", "data": { "option": "exchange" } })),
                Some(Intent::ReturnExchange),
            )
            .await;

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].intent, Intent::TrackOrder);
        assert_eq!(calls[0].payload["email"], json!("jo@example.com"));
        assert_eq!(calls[1].intent, Intent::ReturnExchange);
        assert_eq!(calls[1].payload["orderNumber"], json!("1042"));
        assert_eq!(calls[1].payload["option"], json!("exchange"));
    }

    #[tokio::test]
    async fn filter_change_stores_last_filters() {
        let Harness {
            concierge,
            executor,
            ..
        } = harness();

        concierge
            .handle_module_action(
                action(json!({ "type": "filter_change", "data": { "maxPrice": 900 } })),
                Some(Intent::FindProduct),
            )
            .await;

        assert_eq!(
            concierge.state().session.last_filters,
            Some(json!({ "maxPrice": 900 }))
        );
        assert_eq!(executor.calls()[0].payload, json!({ "filters": { "maxPrice": 900 } }));
    }

    #[tokio::test]
    async fn chooser_selection_resets_misses_and_defaults_find_product() {
        let Harness {
            concierge,
            executor,
            ..
        } = harness();
        concierge.submit_text("hello there").await;
        assert_eq!(concierge.miss_count(), 1);

        concierge
            .handle_module_action(
                action(json!({
                    "type": "intent-chooser-select",
                    "data": { "intent": "find_product" }
                })),
                None,
            )
            .await;

        assert_eq!(concierge.miss_count(), 0);
        let calls = executor.calls();
        assert_eq!(calls[0].intent, Intent::FindProduct);
        assert_eq!(
            calls[0].payload,
            json!({ "filters": { "availability": "ready-to-ship" } })
        );
    }

    #[tokio::test]
    async fn csat_marks_session_before_running() {
        let Harness {
            concierge,
            executor,
            ..
        } = harness();

        concierge
            .handle_module_action(
                action(json!({ "type": "submit-csat", "data": { "rating": 5 } })),
                Some(Intent::Csat),
            )
            .await;

        assert!(executor.calls()[0].state.session.has_shown_csat);
        assert_eq!(executor.calls()[0].payload, json!({ "rating": 5 }));
    }

    #[tokio::test]
    async fn view_product_opens_the_product_page() {
        let Harness { concierge, host, .. } = harness();

        concierge
            .handle_module_action(
                action(json!({ "type": "view-product", "data": { "slug": "pave-band" } })),
                None,
            )
            .await;

        assert_eq!(
            host.opened(),
            vec![(
                "http://localhost:3000/products/pave-band".to_string(),
                OpenTarget::SameTab
            )]
        );
    }

    #[tokio::test]
    async fn add_to_cart_reports_both_outcomes() {
        let Harness {
            concierge,
            cart,
            analytics,
            ..
        } = harness();
        cart.reject("sold-out");

        concierge
            .handle_module_action(
                action(json!({ "type": "add-to-cart", "data": { "slug": "pave-band", "quantity": 2 } })),
                None,
            )
            .await;
        concierge
            .handle_module_action(
                action(json!({ "type": "add-to-cart", "data": { "slug": "sold-out" } })),
                None,
            )
            .await;

        assert_eq!(
            cart.calls(),
            vec![("pave-band".to_string(), 2), ("sold-out".to_string(), 1)]
        );
        let texts: Vec<String> = concierge
            .state()
            .messages
            .iter()
            .filter_map(|message| message.text().map(str::to_string))
            .collect();
        assert_eq!(texts[0], "Added to your bag.");
        assert!(texts[1].starts_with("Sorry"));
        assert_eq!(
            analytics.events_named("cart_add_failed"),
            vec![json!({ "slug": "sold-out", "quantity": 1 })]
        );
    }

    #[tokio::test]
    async fn text_updates_uses_backend_message_verbatim() {
        let Harness {
            concierge,
            backend,
            ..
        } = harness();
        backend.set_order_reply(Some("Texts on the way to ***-1234."));
        concierge.with_store(|store| {
            store.update_session(SessionPatch {
                last_order: Some(Some(OrderRef {
                    order_id: Some("o-9".to_string()),
                    order_number: None,
                })),
                ..SessionPatch::default()
            })
        });

        concierge
            .handle_module_action(action(json!({ "type": "text-updates" })), Some(Intent::TrackOrder))
            .await;

        let requests = backend.order_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].origin_intent, Some(Intent::TrackOrder));
        assert_eq!(requests[0].order_id.as_deref(), Some("o-9"));
        assert_eq!(
            concierge.state().messages.last().and_then(|message| message.text()),
            Some("Texts on the way to ***-1234.")
        );
    }

    #[tokio::test]
    async fn text_updates_failure_apologises() {
        let Harness {
            concierge,
            backend,
            analytics,
            ..
        } = harness();
        backend.fail(true);
        concierge.with_store(|store| {
            store.update_session(SessionPatch {
                last_order: Some(Some(OrderRef {
                    order_id: None,
                    order_number: Some("1042".to_string()),
                })),
                ..SessionPatch::default()
            })
        });

        concierge
            .handle_module_action(action(json!({ "type": "text-updates" })), None)
            .await;

        assert_eq!(
            concierge.state().messages.last().and_then(|message| message.text()),
            Some(ORDER_UPDATES_APOLOGY)
        );
        assert_eq!(analytics.events_named("order_updates_failed").len(), 1);
    }

    #[tokio::test]
    async fn request_human_runs_stylist_contact() {
        let Harness {
            concierge,
            executor,
            ..
        } = harness();

        concierge
            .handle_module_action(action(json!({ "type": "request-human" })), None)
            .await;

        assert_eq!(executor.calls()[0].intent, Intent::StylistContact);
    }

    #[tokio::test]
    async fn shortlist_actions_are_delegated() {
        let Harness { concierge, .. } = harness();
        let product = ProductSummary {
            id: "p1".to_string(),
            title: "Ring A".to_string(),
            slug: None,
            price: 500.0,
            description: None,
            shipping_promise: None,
        };

        concierge
            .handle_module_action(ModuleAction::ShortlistAdd { product }, None)
            .await;
        concierge
            .handle_module_action(
                ModuleAction::ShortlistRemove {
                    id: "p1".to_string(),
                },
                None,
            )
            .await;

        assert!(concierge.state().session.shortlist.is_empty());
    }
}
