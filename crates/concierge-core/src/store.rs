use super::actions::WidgetAction;
use super::persistence::encode_snapshot;
use super::persistence::hydrate_snapshot;
use super::persistence::read_intro_dismissed;
use super::persistence::StorageArea;
use super::persistence::INTRO_DISMISSED_KEY;
use super::persistence::SESSION_STATE_KEY;
use super::reducer::reduce;
use super::reducer::WidgetEffect;
use super::state::new_session_id;
use super::state::Message;
use super::state::Session;
use super::state::SessionPatch;
use super::state::WidgetState;

/// Owns the widget state and mirrors every durable change into storage.
pub struct WidgetStore {
    state: WidgetState,
    session_storage: Box<dyn StorageArea>,
    local_storage: Box<dyn StorageArea>,
    frames_requested: u64,
}

impl std::fmt::Debug for WidgetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetStore")
            .field("state", &self.state)
            .field("frames_requested", &self.frames_requested)
            .finish_non_exhaustive()
    }
}

impl WidgetStore {
    /// Hydrates from session storage, falling back to a fresh session seeded
    /// with the local intro-dismissed flag.
    pub fn load(
        session_storage: Box<dyn StorageArea>,
        local_storage: Box<dyn StorageArea>,
    ) -> Self {
        let base = Session::fresh();
        let state = match session_storage.get_item(SESSION_STATE_KEY) {
            Ok(Some(raw)) => match hydrate_snapshot(&raw, &base) {
                Ok(restored) => {
                    tracing::debug!(
                        session_id = %restored.session.id,
                        messages = restored.messages.len(),
                        "hydrated widget state"
                    );
                    let mut state = WidgetState::new(restored.session);
                    state.messages = restored.messages;
                    Some(state)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "discarding stored widget state");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "session storage unavailable");
                None
            }
        };

        let state = state.unwrap_or_else(|| {
            let mut session = base;
            session.intro_dismissed_at = read_intro_dismissed(local_storage.as_ref());
            tracing::debug!(session_id = %session.id, "starting fresh session");
            WidgetState::new(session)
        });

        Self {
            state,
            session_storage,
            local_storage,
            frames_requested: 0,
        }
    }

    /// Synchronous read of the single source of truth.
    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    pub fn frames_requested(&self) -> u64 {
        self.frames_requested
    }

    pub fn dispatch(&mut self, action: WidgetAction) {
        let effects = reduce(&mut self.state, action);
        for effect in effects {
            self.apply_effect(effect);
        }
    }

    pub fn open(&mut self) {
        self.dispatch(WidgetAction::Open);
    }

    pub fn close(&mut self) {
        self.dispatch(WidgetAction::Close);
    }

    pub fn toggle(&mut self) {
        self.dispatch(WidgetAction::Toggle);
    }

    pub fn append_messages(&mut self, messages: Vec<Message>) {
        self.dispatch(WidgetAction::AppendMessages(messages));
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.dispatch(WidgetAction::ReplaceMessages(messages));
    }

    pub fn update_session(&mut self, patch: SessionPatch) {
        self.dispatch(WidgetAction::UpdateSession(patch));
    }

    pub fn set_processing(&mut self, active: bool) {
        self.dispatch(WidgetAction::SetProcessing(active));
    }

    pub fn reset(&mut self) {
        self.dispatch(WidgetAction::Reset {
            session_id: new_session_id(),
        });
    }

    pub fn dismiss_intro(&mut self, now_ms: i64) {
        self.update_session(SessionPatch {
            intro_dismissed_at: Some(Some(now_ms)),
            ..SessionPatch::default()
        });
    }

    fn apply_effect(&mut self, effect: WidgetEffect) {
        match effect {
            WidgetEffect::PersistSnapshot => self.persist_snapshot(),
            WidgetEffect::PersistIntroDismissed(value) => self.persist_intro(value),
            WidgetEffect::RequestFrame => {
                self.frames_requested = self.frames_requested.saturating_add(1);
            }
        }
    }

    fn persist_snapshot(&self) {
        let result = encode_snapshot(&self.state.messages, &self.state.session)
            .and_then(|encoded| self.session_storage.set_item(SESSION_STATE_KEY, &encoded));
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist widget state");
        }
    }

    fn persist_intro(&self, value: Option<i64>) {
        let result = match value {
            Some(ts) => self
                .local_storage
                .set_item(INTRO_DISMISSED_KEY, &ts.to_string()),
            None => self.local_storage.remove_item(INTRO_DISMISSED_KEY),
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist intro dismissal");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::persistence::MemoryStorage;
    use crate::persistence::StorageError;
    use crate::state::Intent;
    use crate::state::ModulePayload;
    use crate::state::ModuleType;
    use crate::state::OrderRef;

    struct BrokenStorage;

    impl StorageArea for BrokenStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("quota exceeded")))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("quota exceeded")))
        }

        fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("quota exceeded")))
        }
    }

    fn store_with(session: &MemoryStorage, local: &MemoryStorage) -> WidgetStore {
        WidgetStore::load(Box::new(session.clone()), Box::new(local.clone()))
    }

    #[test]
    fn reload_restores_messages_and_session() {
        let session_area = MemoryStorage::new();
        let local_area = MemoryStorage::new();

        let mut store = store_with(&session_area, &local_area);
        store.open();
        store.append_messages(vec![
            Message::guest_text("where is my order"),
            Message::concierge_module(
                ModulePayload::new(ModuleType::OrderLookup),
                Some(Intent::TrackOrder),
            ),
        ]);
        store.update_session(SessionPatch {
            last_order: Some(Some(OrderRef {
                order_id: None,
                order_number: Some("1042".to_string()),
            })),
            ..SessionPatch::default()
        });
        let before = store.state().clone();

        let reopened = store_with(&session_area, &local_area);
        assert_eq!(reopened.state().messages, before.messages);
        assert_eq!(reopened.state().session, before.session);
        assert!(!reopened.state().is_open);
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_fresh_session_with_intro_flag() {
        let session_area = MemoryStorage::new();
        let local_area = MemoryStorage::new();
        session_area
            .set_item(SESSION_STATE_KEY, "{\"messages\": 3")
            .expect("seed");
        local_area
            .set_item(INTRO_DISMISSED_KEY, "1700000000000")
            .expect("seed");

        let store = store_with(&session_area, &local_area);
        assert!(store.state().messages.is_empty());
        assert!(store.state().session.id.starts_with("sess-"));
        assert_eq!(
            store.state().session.intro_dismissed_at,
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn storage_failures_never_escape() {
        let mut store = WidgetStore::load(Box::new(BrokenStorage), Box::new(BrokenStorage));
        store.append_messages(vec![Message::guest_text("hello")]);
        store.dismiss_intro(1);
        assert_eq!(store.state().messages.len(), 1);
        assert_eq!(store.state().session.intro_dismissed_at, Some(1));
    }

    #[test]
    fn dismissing_intro_writes_local_flag() {
        let session_area = MemoryStorage::new();
        let local_area = MemoryStorage::new();
        let mut store = store_with(&session_area, &local_area);
        store.dismiss_intro(1_234);
        assert_eq!(
            local_area.get_item(INTRO_DISMISSED_KEY).expect("get").as_deref(),
            Some("1234")
        );
    }

    #[test]
    fn reset_issues_a_new_session_id_and_persists() {
        let session_area = MemoryStorage::new();
        let local_area = MemoryStorage::new();
        let mut store = store_with(&session_area, &local_area);
        let first_id = store.state().session.id.clone();
        store.append_messages(vec![Message::guest_text("hi")]);

        store.reset();

        assert_ne!(store.state().session.id, first_id);
        let reopened = store_with(&session_area, &local_area);
        assert_eq!(reopened.state().session.id, store.state().session.id);
        assert!(reopened.state().messages.is_empty());
    }

    #[test]
    fn state_changes_request_frames() {
        let mut store = store_with(&MemoryStorage::new(), &MemoryStorage::new());
        store.toggle();
        store.set_processing(true);
        store.set_processing(false);
        store.close();
        assert_eq!(store.frames_requested(), 4);
    }
}
