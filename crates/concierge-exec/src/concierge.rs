use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use concierge_core::classifier::detect_intent;
use concierge_core::classifier::ClassifierContext;
use concierge_core::config::ConciergeConfig;
use concierge_core::config::StorefrontConfig;
use concierge_core::disambiguation::ClassificationDecision;
use concierge_core::disambiguation::ClassificationPolicy;
use concierge_core::disambiguation::MissTracker;
use concierge_core::store::WidgetStore;
use concierge_core::Intent;
use concierge_core::Message;
use concierge_core::ModulePayload;
use concierge_core::ProductSummary;
use concierge_core::SessionPatch;
use concierge_core::WidgetState;
use serde_json::json;
use serde_json::Value;

use crate::analytics::INTENT_DISAMBIGUATION;
use crate::contracts::Analytics;
use crate::contracts::CartClient;
use crate::contracts::HostBridge;
use crate::contracts::IntentExecutor;
use crate::contracts::IntentExtra;
use crate::contracts::SupportBackend;

pub struct Collaborators {
    pub executor: Arc<dyn IntentExecutor>,
    pub cart: Arc<dyn CartClient>,
    pub analytics: Arc<dyn Analytics>,
    pub host: Arc<dyn HostBridge>,
    pub backend: Arc<dyn SupportBackend>,
}

/// The command surface a host page drives. Owns the store and the
/// transient miss counter; collaborators are shared handles.
pub struct Concierge {
    store: Mutex<WidgetStore>,
    misses: Mutex<MissTracker>,
    policy: ClassificationPolicy,
    pub(crate) storefront: StorefrontConfig,
    pub(crate) executor: Arc<dyn IntentExecutor>,
    pub(crate) cart: Arc<dyn CartClient>,
    pub(crate) analytics: Arc<dyn Analytics>,
    pub(crate) host: Arc<dyn HostBridge>,
    pub(crate) backend: Arc<dyn SupportBackend>,
}

impl Concierge {
    pub fn new(store: WidgetStore, config: &ConciergeConfig, collaborators: Collaborators) -> Self {
        Self {
            store: Mutex::new(store),
            misses: Mutex::new(MissTracker::from_config(&config.disambiguation)),
            policy: ClassificationPolicy::from_config(&config.classifier),
            storefront: config.storefront.clone(),
            executor: collaborators.executor,
            cart: collaborators.cart,
            analytics: collaborators.analytics,
            host: collaborators.host,
            backend: collaborators.backend,
        }
    }

    /// Snapshot of the current widget state.
    pub fn state(&self) -> WidgetState {
        self.with_store(|store| store.state().clone())
    }

    /// Bumps whenever the store asks the host to redraw.
    pub fn frames_requested(&self) -> u64 {
        self.with_store(|store| store.frames_requested())
    }

    pub fn miss_count(&self) -> u32 {
        self.with_misses(|misses| misses.count())
    }

    pub fn open(&self) {
        self.with_store(WidgetStore::open);
    }

    pub fn close(&self) {
        self.with_store(WidgetStore::close);
    }

    pub fn toggle(&self) {
        self.with_store(WidgetStore::toggle);
    }

    pub fn reset(&self) {
        self.with_store(WidgetStore::reset);
        self.with_misses(MissTracker::reset);
    }

    pub fn dismiss_intro(&self) {
        let now = chrono::Utc::now().timestamp_millis();
        self.with_store(|store| store.dismiss_intro(now));
    }

    /// Free text typed by the guest: classify, then execute or disambiguate.
    pub async fn submit_text(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let context = self.with_store(|store| {
            store.open();
            store.append_messages(vec![Message::guest_text(text)]);
            let session = &store.state().session;
            ClassifierContext {
                last_intent: session.last_intent,
                last_filters: session.last_filters.clone(),
            }
        });

        let detection = detect_intent(text, None, &context);
        match self.policy.decide(detection) {
            ClassificationDecision::Execute(detection) => {
                tracing::debug!(
                    intent = %detection.intent,
                    confidence = detection.confidence,
                    source = detection.source.as_str(),
                    reason = %detection.reason,
                    "classified guest text"
                );
                self.with_misses(MissTracker::reset);
                self.run_intent(
                    detection.intent,
                    IntentExtra::new(detection.payload, detection.source.as_str()),
                )
                .await;
            }
            ClassificationDecision::Disambiguate {
                reason,
                emphasize_human,
                candidate,
            } => {
                let candidate_intent = candidate.as_ref().map(|detection| detection.intent);
                let (chooser, misses) = self.with_misses(|misses| {
                    let chooser = misses.record_miss(reason, emphasize_human, candidate_intent);
                    (chooser, misses.count())
                });
                self.track(
                    INTENT_DISAMBIGUATION,
                    json!({
                        "reason": reason.as_str(),
                        "candidate": candidate_intent.map(Intent::as_str),
                        "confidence": candidate.as_ref().map(|detection| detection.confidence),
                        "misses": misses,
                    }),
                );
                self.post_module(chooser, None);
            }
        }
    }

    /// Host-driven filter change; runs a product search with them.
    pub async fn set_filters(&self, filters: Value) {
        self.with_store(|store| {
            store.update_session(SessionPatch {
                last_filters: Some(Some(filters.clone())),
                ..SessionPatch::default()
            })
        });
        self.run_intent(
            Intent::FindProduct,
            IntentExtra::new(json!({ "filters": filters }), "host"),
        )
        .await;
    }

    /// Host-driven shortlist add; also opens the widget.
    pub async fn add_to_shortlist(&self, product: ProductSummary) {
        self.open();
        self.shortlist_add(product).await;
    }

    pub(crate) fn with_store<R>(&self, f: impl FnOnce(&mut WidgetStore) -> R) -> R {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *store)
    }

    pub(crate) fn with_misses<R>(&self, f: impl FnOnce(&mut MissTracker) -> R) -> R {
        let mut misses = self.misses.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *misses)
    }

    pub(crate) fn track(&self, event: &str, properties: Value) {
        self.analytics.track(event, properties);
    }

    pub(crate) fn say(&self, text: impl Into<String>, intent: Option<Intent>) {
        let message = Message::concierge_text(text, intent);
        self.with_store(|store| store.append_messages(vec![message]));
    }

    pub(crate) fn post_module(&self, payload: ModulePayload, intent: Option<Intent>) {
        let message = Message::concierge_module(payload, intent);
        self.with_store(|store| store.append_messages(vec![message]));
    }
}

/// Holds `isProcessing` raised for its lifetime.
pub(crate) struct ProcessingGuard<'a> {
    concierge: &'a Concierge,
}

impl<'a> ProcessingGuard<'a> {
    pub(crate) fn acquire(concierge: &'a Concierge) -> Self {
        concierge.with_store(|store| store.set_processing(true));
        Self { concierge }
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.concierge
            .with_store(|store| store.set_processing(false));
    }
}

#[cfg(test)]
mod tests {
    use concierge_core::ModuleType;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::harness;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn where_is_my_order_runs_track_order_once() {
        let Harness {
            concierge,
            executor,
            analytics,
            ..
        } = harness();

        concierge.submit_text("where is my order").await;

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].intent, Intent::TrackOrder);
        assert!(calls[0].state.is_processing);

        let state = concierge.state();
        assert!(state.is_open);
        assert!(!state.is_processing);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].text(), Some("where is my order"));
        assert_eq!(state.messages[1].intent, Some(Intent::TrackOrder));
        assert_eq!(state.session.last_intent, Some(Intent::TrackOrder));

        let detected = analytics.events_named("intent_detected");
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0]["source"], json!("keyword"));
    }

    #[tokio::test]
    async fn two_misses_escalate_and_a_match_resets() {
        let Harness {
            concierge,
            executor,
            ..
        } = harness();

        concierge.submit_text("hello there").await;
        concierge.submit_text("what about the thing").await;
        assert_eq!(concierge.miss_count(), 2);
        assert!(executor.calls().is_empty());

        let choosers: Vec<ModulePayload> = concierge
            .state()
            .messages
            .iter()
            .filter_map(|message| match &message.body {
                concierge_core::MessageBody::Module(payload) => Some(payload.clone()),
                concierge_core::MessageBody::Text(_) => None,
            })
            .collect();
        assert_eq!(choosers.len(), 2);
        assert_eq!(choosers[0].module_type, ModuleType::IntentChooser);
        assert_eq!(choosers[0].field("emphasizeHuman"), Some(&json!(false)));
        assert_eq!(choosers[1].field("emphasizeHuman"), Some(&json!(true)));

        concierge.submit_text("track my order").await;
        assert_eq!(concierge.miss_count(), 0);
    }

    #[tokio::test]
    async fn set_filters_stores_them_and_searches() {
        let Harness {
            concierge,
            executor,
            ..
        } = harness();

        concierge.set_filters(json!({ "metal": "platinum" })).await;

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].intent, Intent::FindProduct);
        assert_eq!(calls[0].payload, json!({ "filters": { "metal": "platinum" } }));
        assert_eq!(
            concierge.state().session.last_filters,
            Some(json!({ "metal": "platinum" }))
        );
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let Harness { concierge, .. } = harness();
        concierge.submit_text("   ").await;
        assert!(concierge.state().messages.is_empty());
        assert!(!concierge.state().is_open);
    }

    #[test]
    fn processing_guard_releases_on_drop() {
        let Harness { concierge, .. } = harness();
        {
            let _outer = ProcessingGuard::acquire(&concierge);
            let inner = ProcessingGuard::acquire(&concierge);
            drop(inner);
            assert!(concierge.state().is_processing);
        }
        assert!(!concierge.state().is_processing);
    }
}
