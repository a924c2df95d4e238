use std::collections::HashSet;

use super::actions::WidgetAction;
use super::state::Message;
use super::state::ModuleType;
use super::state::Session;
use super::state::WidgetState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEffect {
    /// `messages` or `session` changed and should be written to session storage.
    PersistSnapshot,
    /// The intro banner dismissal changed and should be written to local storage.
    PersistIntroDismissed(Option<i64>),
    RequestFrame,
}

pub fn reduce(state: &mut WidgetState, action: WidgetAction) -> Vec<WidgetEffect> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    match action {
        WidgetAction::Open => set_open(state, true),
        WidgetAction::Close => set_open(state, false),
        WidgetAction::Toggle => {
            let next = !state.is_open;
            set_open(state, next)
        }
        WidgetAction::AppendMessages(messages) => {
            if messages.is_empty() {
                return Vec::new();
            }
            state.messages.extend(messages);
            state.session.last_active = now_ms;
            vec![WidgetEffect::PersistSnapshot, WidgetEffect::RequestFrame]
        }
        WidgetAction::ReplaceMessages(messages) => {
            state.messages = messages;
            vec![WidgetEffect::PersistSnapshot, WidgetEffect::RequestFrame]
        }
        WidgetAction::UpdateSession(patch) => {
            let intro_before = state.session.intro_dismissed_at;
            patch.apply(&mut state.session);
            state.session.last_active = now_ms;
            let mut effects = vec![WidgetEffect::PersistSnapshot];
            if state.session.intro_dismissed_at != intro_before {
                effects.push(WidgetEffect::PersistIntroDismissed(
                    state.session.intro_dismissed_at,
                ));
            }
            effects.push(WidgetEffect::RequestFrame);
            effects
        }
        WidgetAction::SetProcessing(active) => {
            state.in_flight = if active {
                state.in_flight.saturating_add(1)
            } else {
                state.in_flight.saturating_sub(1)
            };
            let processing = state.in_flight > 0;
            if processing == state.is_processing {
                return Vec::new();
            }
            state.is_processing = processing;
            vec![WidgetEffect::RequestFrame]
        }
        WidgetAction::Reset { session_id } => {
            let mut session = Session::new(session_id, now_ms);
            session.intro_dismissed_at = state.session.intro_dismissed_at;
            state.session = session;
            state.messages.clear();
            state.is_processing = false;
            state.in_flight = 0;
            vec![WidgetEffect::PersistSnapshot, WidgetEffect::RequestFrame]
        }
    }
}

fn set_open(state: &mut WidgetState, open: bool) -> Vec<WidgetEffect> {
    if state.is_open == open {
        return Vec::new();
    }
    state.is_open = open;
    vec![WidgetEffect::RequestFrame]
}

/// Keeps only the newest message of each module type. Text messages and the
/// relative order of survivors are untouched.
pub fn prune_module_duplicates(messages: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<&ModuleType> = HashSet::new();
    let mut keep = vec![true; messages.len()];
    for (idx, message) in messages.iter().enumerate().rev() {
        if let Some(module_type) = message.module_type() {
            if !seen.insert(module_type) {
                keep[idx] = false;
            }
        }
    }
    messages
        .iter()
        .zip(keep)
        .filter_map(|(message, keep)| keep.then(|| message.clone()))
        .collect()
}

#[cfg(test)]
mod tests;
