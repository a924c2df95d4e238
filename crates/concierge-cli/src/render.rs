use std::collections::HashSet;

use concierge_core::Message;
use concierge_core::MessageBody;
use concierge_core::ModulePayload;
use concierge_core::Role;
use concierge_core::WidgetState;
use serde_json::Value;

/// Prints messages the terminal has not shown yet. Pruned modules simply
/// stop appearing; nothing is reprinted.
#[derive(Debug, Default)]
pub struct Transcript {
    shown: HashSet<String>,
}

impl Transcript {
    /// Marks everything currently in `state` as already shown.
    pub fn mark_all(&mut self, state: &WidgetState) {
        self.shown
            .extend(state.messages.iter().map(|message| message.id.clone()));
    }

    pub fn clear(&mut self) {
        self.shown.clear();
    }

    pub fn render_new(&mut self, state: &WidgetState) -> Vec<String> {
        state
            .messages
            .iter()
            .filter(|message| message.role == Role::Concierge)
            .filter(|message| self.shown.insert(message.id.clone()))
            .map(render_message)
            .collect()
    }
}

pub fn render_message(message: &Message) -> String {
    match &message.body {
        MessageBody::Text(text) => format!("concierge> {text}"),
        MessageBody::Module(payload) => format!("concierge> {}", render_module(payload)),
    }
}

fn render_module(payload: &ModulePayload) -> String {
    let kind = payload.module_type.as_str();
    match kind {
        "product-carousel" | "shortlist-panel" => {
            let items = payload
                .field("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .map(|item| {
                            format!(
                                "\n    - {} [{}] ${}",
                                item["title"].as_str().unwrap_or("?"),
                                item["id"].as_str().unwrap_or("?"),
                                item["price"]
                            )
                        })
                        .collect::<String>()
                })
                .unwrap_or_default();
            format!("[{kind}]{items}")
        }
        "intent-chooser" => {
            let prompt = payload
                .field("prompt")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let options = payload
                .field("options")
                .and_then(Value::as_array)
                .map(|options| {
                    options
                        .iter()
                        .filter_map(|option| option["intent"].as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!("[{kind}] {prompt}\n    options: {options}")
        }
        _ => {
            let fields = Value::Object(payload.fields.clone());
            format!("[{kind}] {fields}")
        }
    }
}
