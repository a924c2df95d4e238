use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use concierge_core::config::ConciergeConfig;
use concierge_core::persistence::MemoryStorage;
use concierge_core::store::WidgetStore;
use concierge_core::Message;
use serde_json::Value;

use crate::backend::BackendError;
use crate::concierge::Collaborators;
use crate::concierge::Concierge;
use crate::contracts::Analytics;
use crate::contracts::CartClient;
use crate::contracts::ExecuteRequest;
use crate::contracts::ExecuteResponse;
use crate::contracts::ExecutorError;
use crate::contracts::HostBridge;
use crate::contracts::HostError;
use crate::contracts::IntentExecutor;
use crate::contracts::OpenTarget;
use crate::contracts::OrderUpdatesReply;
use crate::contracts::OrderUpdatesRequest;
use crate::contracts::ShareContent;
use crate::contracts::ShortlistSync;
use crate::contracts::SupportBackend;

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Responder =
    Box<dyn Fn(&ExecuteRequest) -> Result<ExecuteResponse, ExecutorError> + Send + Sync>;

pub(crate) struct ScriptedExecutor {
    responder: Responder,
    calls: Mutex<Vec<ExecuteRequest>>,
}

impl ScriptedExecutor {
    pub(crate) fn new(
        responder: impl Fn(&ExecuteRequest) -> Result<ExecuteResponse, ExecutorError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every intent with one text message tagged with that intent.
    pub(crate) fn echo() -> Self {
        Self::new(|request| {
            Ok(ExecuteResponse {
                messages: vec![Message::concierge_text(
                    format!("handled {}", request.intent),
                    Some(request.intent),
                )],
                session_patch: None,
                error: None,
            })
        })
    }

    pub(crate) fn failing(reason: &'static str) -> Self {
        Self::new(move |_| Err(ExecutorError::Failed(reason.to_string())))
    }

    pub(crate) fn calls(&self) -> Vec<ExecuteRequest> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl IntentExecutor for ScriptedExecutor {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, ExecutorError> {
        let result = (self.responder)(&request);
        locked(&self.calls).push(request);
        result
    }
}

#[derive(Default)]
pub(crate) struct FakeCart {
    rejected: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl FakeCart {
    pub(crate) fn reject(&self, slug: &str) {
        locked(&self.rejected).insert(slug.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<(String, u32)> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl CartClient for FakeCart {
    async fn add_item(&self, slug: &str, quantity: u32) -> bool {
        locked(&self.calls).push((slug.to_string(), quantity));
        !locked(&self.rejected).contains(slug)
    }
}

#[derive(Default)]
pub(crate) struct RecordingAnalytics {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingAnalytics {
    pub(crate) fn events_named(&self, name: &str) -> Vec<Value> {
        locked(&self.events)
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, properties)| properties.clone())
            .collect()
    }
}

impl Analytics for RecordingAnalytics {
    fn track(&self, event: &str, properties: Value) {
        locked(&self.events).push((event.to_string(), properties));
    }
}

pub(crate) struct FakeHost {
    confirm_answer: AtomicBool,
    native_share: AtomicBool,
    clipboard: AtomicBool,
    open_url: AtomicBool,
    prompts: Mutex<Vec<String>>,
    opened: Mutex<Vec<(String, OpenTarget)>>,
    shared: Mutex<Vec<ShareContent>>,
    copied: Mutex<Vec<String>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            confirm_answer: AtomicBool::new(true),
            native_share: AtomicBool::new(true),
            clipboard: AtomicBool::new(true),
            open_url: AtomicBool::new(true),
            prompts: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            shared: Mutex::new(Vec::new()),
            copied: Mutex::new(Vec::new()),
        }
    }
}

impl FakeHost {
    pub(crate) fn answer_confirm(&self, answer: bool) {
        self.confirm_answer.store(answer, Ordering::SeqCst);
    }

    pub(crate) fn disable_native_share(&self) {
        self.native_share.store(false, Ordering::SeqCst);
    }

    pub(crate) fn disable_clipboard(&self) {
        self.clipboard.store(false, Ordering::SeqCst);
    }

    pub(crate) fn disable_open_url(&self) {
        self.open_url.store(false, Ordering::SeqCst);
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        locked(&self.prompts).clone()
    }

    pub(crate) fn opened(&self) -> Vec<(String, OpenTarget)> {
        locked(&self.opened).clone()
    }

    pub(crate) fn shared(&self) -> Vec<ShareContent> {
        locked(&self.shared).clone()
    }

    pub(crate) fn clipboard(&self) -> Vec<String> {
        locked(&self.copied).clone()
    }
}

#[async_trait]
impl HostBridge for FakeHost {
    fn open_url(&self, url: &str, target: OpenTarget) -> Result<(), HostError> {
        if !self.open_url.load(Ordering::SeqCst) {
            return Err(HostError::Unsupported("opening urls"));
        }
        locked(&self.opened).push((url.to_string(), target));
        Ok(())
    }

    async fn confirm(&self, prompt: &str) -> bool {
        locked(&self.prompts).push(prompt.to_string());
        self.confirm_answer.load(Ordering::SeqCst)
    }

    async fn native_share(&self, content: &ShareContent) -> Result<(), HostError> {
        if !self.native_share.load(Ordering::SeqCst) {
            return Err(HostError::Unsupported("native share"));
        }
        locked(&self.shared).push(content.clone());
        Ok(())
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), HostError> {
        if !self.clipboard.load(Ordering::SeqCst) {
            return Err(HostError::Failed("clipboard denied".to_string()));
        }
        locked(&self.copied).push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    failing: AtomicBool,
    order_reply: Mutex<Option<String>>,
    shortlist_requests: Mutex<Vec<ShortlistSync>>,
    order_requests: Mutex<Vec<OrderUpdatesRequest>>,
}

impl FakeBackend {
    pub(crate) fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn set_order_reply(&self, message: Option<&str>) {
        *locked(&self.order_reply) = message.map(str::to_string);
    }

    pub(crate) fn shortlist_requests(&self) -> Vec<ShortlistSync> {
        locked(&self.shortlist_requests).clone()
    }

    pub(crate) fn order_requests(&self) -> Vec<OrderUpdatesRequest> {
        locked(&self.order_requests).clone()
    }
}

#[async_trait]
impl SupportBackend for FakeBackend {
    async fn sync_shortlist(
        &self,
        request: &ShortlistSync,
        _request_id: &str,
    ) -> Result<(), BackendError> {
        locked(&self.shortlist_requests).push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Status(503));
        }
        Ok(())
    }

    async fn subscribe_order_updates(
        &self,
        request: &OrderUpdatesRequest,
        _request_id: &str,
    ) -> Result<OrderUpdatesReply, BackendError> {
        locked(&self.order_requests).push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Status(503));
        }
        Ok(OrderUpdatesReply {
            message: locked(&self.order_reply).clone(),
        })
    }
}

pub(crate) struct Harness {
    pub(crate) concierge: Concierge,
    pub(crate) executor: Arc<ScriptedExecutor>,
    pub(crate) cart: Arc<FakeCart>,
    pub(crate) analytics: Arc<RecordingAnalytics>,
    pub(crate) host: Arc<FakeHost>,
    pub(crate) backend: Arc<FakeBackend>,
}

pub(crate) fn harness() -> Harness {
    harness_with(ScriptedExecutor::echo())
}

pub(crate) fn harness_with(executor: ScriptedExecutor) -> Harness {
    let executor = Arc::new(executor);
    let cart = Arc::new(FakeCart::default());
    let analytics = Arc::new(RecordingAnalytics::default());
    let host = Arc::new(FakeHost::default());
    let backend = Arc::new(FakeBackend::default());
    let store = WidgetStore::load(
        Box::new(MemoryStorage::new()),
        Box::new(MemoryStorage::new()),
    );
    let concierge = Concierge::new(
        store,
        &ConciergeConfig::default(),
        Collaborators {
            executor: executor.clone(),
            cart: cart.clone(),
            analytics: analytics.clone(),
            host: host.clone(),
            backend: backend.clone(),
        },
    );
    Harness {
        concierge,
        executor,
        cart,
        analytics,
        host,
        backend,
    }
}
