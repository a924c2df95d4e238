use pretty_assertions::assert_eq;

pub(super) use super::prune_module_duplicates;
pub(super) use super::reduce;
pub(super) use super::WidgetEffect;
pub(super) use crate::actions::WidgetAction;
pub(super) use crate::state::Intent;
pub(super) use crate::state::Message;
pub(super) use crate::state::ModulePayload;
pub(super) use crate::state::ModuleType;
pub(super) use crate::state::OrderRef;
pub(super) use crate::state::ProductSummary;
pub(super) use crate::state::Session;
pub(super) use crate::state::SessionPatch;
pub(super) use crate::state::WidgetState;


fn state() -> WidgetState {
    WidgetState::new(Session::new("sess-test", 0))
}

fn text(body: &str) -> Message {
    Message::concierge_text(body, None)
}

fn module(module_type: ModuleType, marker: &str) -> Message {
    Message::concierge_module(
        ModulePayload::new(module_type).with("marker", marker),
        None,
    )
}

fn product(id: &str, title: &str, price: f64) -> ProductSummary {
    ProductSummary {
        id: id.to_string(),
        title: title.to_string(),
        slug: None,
        price,
        description: None,
        shipping_promise: None,
    }
}

fn run(state: &mut WidgetState, action: WidgetAction) -> Vec<WidgetEffect> {
    reduce(state, action)
}

fn assert_unique_shortlist(state: &WidgetState) {
    let mut ids: Vec<&str> = state
        .session
        .shortlist
        .iter()
        .map(|item| item.id.as_str())
        .collect();
    let before = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(before, ids.len(), "shortlist ids must be unique");
}
