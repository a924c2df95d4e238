use serde_json::json;
use serde_json::Value;

use super::classifier::Detection;
use super::config::ClassifierConfig;
use super::config::DisambiguationConfig;
use super::state::Intent;
use super::state::ModulePayload;
use super::state::ModuleType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    NoMatch,
    Ambiguous,
    LowConfidence,
}

impl MissReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoMatch => "no_match",
            Self::Ambiguous => "ambiguous",
            Self::LowConfidence => "low_confidence",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationDecision {
    Execute(Detection),
    Disambiguate {
        reason: MissReason,
        emphasize_human: bool,
        candidate: Option<Detection>,
    },
}

/// Maps a detection's confidence onto execute / disambiguate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationPolicy {
    pub execute_threshold: f32,
    pub ambiguous_threshold: f32,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

impl ClassificationPolicy {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            execute_threshold: config.execute_threshold,
            ambiguous_threshold: config.ambiguous_threshold.min(config.execute_threshold),
        }
    }

    pub fn decide(&self, detection: Option<Detection>) -> ClassificationDecision {
        let Some(detection) = detection else {
            return ClassificationDecision::Disambiguate {
                reason: MissReason::NoMatch,
                emphasize_human: false,
                candidate: None,
            };
        };
        if detection.confidence >= self.execute_threshold {
            return ClassificationDecision::Execute(detection);
        }
        let (reason, emphasize_human) = if detection.confidence >= self.ambiguous_threshold {
            (MissReason::Ambiguous, false)
        } else {
            (MissReason::LowConfidence, true)
        };
        ClassificationDecision::Disambiguate {
            reason,
            emphasize_human,
            candidate: Some(detection),
        }
    }
}

/// Consecutive classification misses for one widget instance. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissTracker {
    misses: u32,
    escalate_after: u32,
}

impl Default for MissTracker {
    fn default() -> Self {
        Self::from_config(&DisambiguationConfig::default())
    }
}

impl MissTracker {
    pub fn from_config(config: &DisambiguationConfig) -> Self {
        Self {
            misses: 0,
            escalate_after: config.escalate_after.max(1),
        }
    }

    pub fn count(&self) -> u32 {
        self.misses
    }

    pub fn reset(&mut self) {
        if self.misses > 0 {
            tracing::debug!(misses = self.misses, "miss counter reset");
        }
        self.misses = 0;
    }

    /// Counts a miss and builds the `intent-chooser` module to show for it.
    pub fn record_miss(
        &mut self,
        reason: MissReason,
        emphasize_human: bool,
        candidate: Option<Intent>,
    ) -> ModulePayload {
        self.misses = self.misses.saturating_add(1);
        let escalated = self.misses >= self.escalate_after;
        let emphasize_human = emphasize_human || escalated;
        tracing::debug!(
            misses = self.misses,
            reason = reason.as_str(),
            escalated,
            "classification miss"
        );

        let prompt = if escalated {
            "I'm still not sure I follow. A stylist can take it from here, or pick one of these."
                .to_string()
        } else if let Some(intent) = candidate {
            format!(
                "Did you mean {}? Pick the closest option below.",
                intent.label().to_lowercase()
            )
        } else {
            "I want to point you the right way. Which of these is closest?".to_string()
        };

        ModulePayload::new(ModuleType::IntentChooser)
            .with("reason", reason.as_str())
            .with("emphasizeHuman", emphasize_human)
            .with("missCount", self.misses)
            .with("prompt", prompt)
            .with("options", Value::Array(chooser_options(candidate, escalated)))
            .with(
                "humanOption",
                json!({ "action": "request-human", "label": "Talk to a stylist" }),
            )
    }
}

/// Default payload for an intent picked from the chooser with nothing else attached.
pub fn chooser_default_payload(intent: Intent) -> Value {
    match intent {
        Intent::FindProduct => json!({ "filters": { "availability": "ready-to-ship" } }),
        _ => json!({}),
    }
}

fn chooser_options(candidate: Option<Intent>, escalated: bool) -> Vec<Value> {
    let mut ordered: Vec<Intent> = Vec::with_capacity(Intent::ALL.len());
    if escalated {
        ordered.push(Intent::StylistContact);
    }
    if let Some(intent) = candidate {
        if !ordered.contains(&intent) {
            ordered.push(intent);
        }
    }
    for intent in Intent::ALL {
        if intent != Intent::Csat && !ordered.contains(&intent) {
            ordered.push(intent);
        }
    }
    ordered
        .into_iter()
        .map(|intent| json!({ "intent": intent.as_str(), "label": intent.label() }))
        .collect()
}
