//! Deterministic intent detection.
//!
//! Rules run in a fixed order and each produces at most one candidate per
//! intent. Scores: explicit intent (1.0) > exact phrase/keyword (0.9, plus a
//! small bonus per extra hit) > one-edit fuzzy keyword (0.6) > short
//! follow-up continuing the previous intent (0.55 with a usable payload,
//! 0.4 without).
//!
//! Product nouns ("ring", "necklace") are weak evidence: they only point at
//! `find_product` when no service rule fires, so "return my ring" is a
//! return.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use super::state::Intent;

pub const EXPLICIT_CONFIDENCE: f32 = 1.0;
pub const KEYWORD_CONFIDENCE: f32 = 0.9;
pub const KEYWORD_BONUS: f32 = 0.03;
pub const KEYWORD_CAP: f32 = 0.98;
pub const FUZZY_CONFIDENCE: f32 = 0.6;
pub const CONTEXT_WITH_PAYLOAD_CONFIDENCE: f32 = 0.55;
pub const CONTEXT_BARE_CONFIDENCE: f32 = 0.4;

const FOLLOW_UP_MAX_WORDS: usize = 4;
const FUZZY_MIN_KEYWORD_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Explicit,
    Keyword,
    Fuzzy,
    Context,
}

impl DetectionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Keyword => "keyword",
            Self::Fuzzy => "fuzzy",
            Self::Context => "context",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub intent: Intent,
    pub confidence: f32,
    pub payload: Value,
    pub source: DetectionSource,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierContext {
    pub last_intent: Option<Intent>,
    pub last_filters: Option<Value>,
}

struct IntentRule {
    intent: Intent,
    phrases: &'static [&'static str],
    keywords: &'static [&'static str],
    /// Counted only when no other rule has a phrase or keyword hit.
    product_terms: &'static [&'static str],
}

const RULES: [IntentRule; 8] = [
    IntentRule {
        intent: Intent::FindProduct,
        phrases: &[
            "looking for",
            "show me",
            "do you have",
            "shop for",
            "ready to ship",
            "gift for",
            "engagement ring",
            "wedding band",
        ],
        keywords: &["browse", "shop"],
        product_terms: &[
            "ring", "necklace", "bracelet", "earring", "pendant", "diamond", "gift", "jewelry",
            "jewellery", "chain", "studs", "buy",
        ],
    },
    IntentRule {
        intent: Intent::TrackOrder,
        phrases: &[
            "where is my order",
            "wheres my order",
            "track my order",
            "track order",
            "order status",
            "has my order shipped",
            "tracking number",
        ],
        keywords: &[
            "order", "tracking", "shipped", "shipping", "delivery", "delivered", "package",
            "arrive",
        ],
        product_terms: &[],
    },
    IntentRule {
        intent: Intent::ReturnExchange,
        phrases: &["return policy", "send it back", "start a return", "exchange it"],
        keywords: &["return", "exchange", "refund"],
        product_terms: &[],
    },
    IntentRule {
        intent: Intent::SizingRepairs,
        phrases: &["ring size", "too big", "too small", "doesnt fit", "broken clasp"],
        keywords: &[
            "size", "sizing", "resize", "resizing", "repair", "fix", "broken", "clasp",
        ],
        product_terms: &[],
    },
    IntentRule {
        intent: Intent::CareWarranty,
        phrases: &["how do i clean", "care instructions", "warranty coverage"],
        keywords: &[
            "clean", "cleaning", "care", "warranty", "tarnish", "polish", "guarantee",
            "insurance",
        ],
        product_terms: &[],
    },
    IntentRule {
        intent: Intent::Financing,
        phrases: &[
            "payment plan",
            "pay over time",
            "monthly payments",
            "buy now pay later",
        ],
        keywords: &[
            "financing", "finance", "klarna", "affirm", "afterpay", "installment", "credit",
        ],
        product_terms: &[],
    },
    IntentRule {
        intent: Intent::StylistContact,
        phrases: &[
            "talk to a person",
            "talk to someone",
            "speak to someone",
            "real person",
            "human being",
            "book an appointment",
            "customer service",
        ],
        keywords: &[
            "stylist", "human", "agent", "appointment", "consultation", "representative",
        ],
        product_terms: &[],
    },
    IntentRule {
        intent: Intent::Csat,
        phrases: &["rate this chat", "leave feedback", "this was helpful", "not helpful"],
        keywords: &["feedback", "rating", "survey"],
        product_terms: &[],
    },
];

const METALS: [&str; 6] = [
    "yellow gold",
    "white gold",
    "rose gold",
    "platinum",
    "silver",
    "gold",
];

const CATEGORIES: [(&str, &str); 6] = [
    ("earring", "earrings"),
    ("necklace", "necklaces"),
    ("bracelet", "bracelets"),
    ("pendant", "pendants"),
    ("band", "rings"),
    ("ring", "rings"),
];

pub fn detect_intent(
    text: &str,
    explicit_intent: Option<Intent>,
    context: &ClassifierContext,
) -> Option<Detection> {
    let normalized = normalize(text);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    if let Some(intent) = explicit_intent {
        return Some(Detection {
            intent,
            confidence: EXPLICIT_CONFIDENCE,
            payload: build_payload(intent, text, &normalized, context, false),
            source: DetectionSource::Explicit,
            reason: "explicit intent".to_string(),
        });
    }

    if tokens.is_empty() {
        return None;
    }

    let service_hit = RULES
        .iter()
        .filter(|rule| rule.product_terms.is_empty())
        .any(|rule| keyword_candidate(rule, &normalized, &tokens, false).is_some());
    let use_product_terms = !service_hit;

    let mut best: Option<Detection> = None;
    for rule in &RULES {
        let candidate = keyword_candidate(rule, &normalized, &tokens, use_product_terms)
            .or_else(|| fuzzy_candidate(rule, &tokens, use_product_terms));
        let Some((confidence, source, reason)) = candidate else {
            continue;
        };
        consider(
            &mut best,
            Detection {
                intent: rule.intent,
                confidence,
                payload: build_payload(rule.intent, text, &normalized, context, false),
                source,
                reason,
            },
        );
    }

    if let Some(last_intent) = context.last_intent {
        if tokens.len() <= FOLLOW_UP_MAX_WORDS {
            let payload = build_payload(last_intent, text, &normalized, context, true);
            let confidence = if has_usable_payload(last_intent, &payload) {
                CONTEXT_WITH_PAYLOAD_CONFIDENCE
            } else {
                CONTEXT_BARE_CONFIDENCE
            };
            consider(
                &mut best,
                Detection {
                    intent: last_intent,
                    confidence,
                    payload,
                    source: DetectionSource::Context,
                    reason: format!("short follow-up to {last_intent}"),
                },
            );
        }
    }

    best
}

/// First candidate wins ties, so rule order decides between equal scores.
fn consider(best: &mut Option<Detection>, candidate: Detection) {
    let replace = match best {
        Some(current) => candidate.confidence > current.confidence,
        None => true,
    };
    if replace {
        *best = Some(candidate);
    }
}

fn keyword_candidate(
    rule: &IntentRule,
    normalized: &str,
    tokens: &[&str],
    use_product_terms: bool,
) -> Option<(f32, DetectionSource, String)> {
    let padded = format!(" {normalized} ");
    let mut hits: Vec<&str> = rule
        .phrases
        .iter()
        .copied()
        .filter(|phrase| padded.contains(&format!(" {phrase} ")))
        .collect();
    for keyword in rule_terms(rule, use_product_terms) {
        if tokens.iter().any(|token| token_matches(token, keyword)) {
            hits.push(keyword);
        }
    }
    if hits.is_empty() {
        return None;
    }
    let bonus = KEYWORD_BONUS * (hits.len() - 1) as f32;
    let confidence = (KEYWORD_CONFIDENCE + bonus).min(KEYWORD_CAP);
    let quoted: Vec<String> = hits.iter().map(|hit| format!("'{hit}'")).collect();
    Some((
        confidence,
        DetectionSource::Keyword,
        format!("matched {}", quoted.join(", ")),
    ))
}

fn fuzzy_candidate(
    rule: &IntentRule,
    tokens: &[&str],
    use_product_terms: bool,
) -> Option<(f32, DetectionSource, String)> {
    rule_terms(rule, use_product_terms)
        .filter(|keyword| keyword.len() >= FUZZY_MIN_KEYWORD_LEN)
        .find(|keyword| {
            tokens
                .iter()
                .any(|token| within_one_edit(token, keyword))
        })
        .map(|keyword| {
            (
                FUZZY_CONFIDENCE,
                DetectionSource::Fuzzy,
                format!("close to '{keyword}'"),
            )
        })
}

fn rule_terms(
    rule: &IntentRule,
    use_product_terms: bool,
) -> impl Iterator<Item = &'static str> {
    let product_terms: &'static [&'static str] = if use_product_terms {
        rule.product_terms
    } else {
        &[]
    };
    rule.keywords.iter().chain(product_terms).copied()
}

fn token_matches(token: &str, keyword: &str) -> bool {
    token == keyword
        || token
            .strip_suffix('s')
            .is_some_and(|stem| stem == keyword)
        || token
            .strip_suffix("es")
            .is_some_and(|stem| stem == keyword)
}

/// True when `a` and `b` differ by at most one insertion, deletion, or substitution.
fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > 1 {
        return false;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let mut i = 0;
    let mut j = 0;
    let mut edits = 0;
    while i < short.len() && j < long.len() {
        if short[i] == long[j] {
            i += 1;
            j += 1;
            continue;
        }
        edits += 1;
        if edits > 1 {
            return false;
        }
        if short.len() == long.len() {
            i += 1;
        }
        j += 1;
    }
    edits + (long.len() - j) + (short.len() - i) <= 1
}

fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() || matches!(c, '#' | '$' | '@' | '.' | '-') {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace()
        .map(|word| word.trim_matches('.'))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_payload(
    intent: Intent,
    raw: &str,
    normalized: &str,
    context: &ClassifierContext,
    continuation: bool,
) -> Value {
    let mut payload = Map::new();
    payload.insert("query".to_string(), Value::String(raw.trim().to_string()));
    match intent {
        Intent::FindProduct => {
            let mut filters = if continuation {
                context
                    .last_filters
                    .as_ref()
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default()
            } else {
                Map::new()
            };
            for (key, value) in extract_filters(raw, normalized) {
                filters.insert(key, value);
            }
            if !filters.is_empty() {
                payload.insert("filters".to_string(), Value::Object(filters));
            }
        }
        Intent::TrackOrder | Intent::ReturnExchange => {
            if let Some(order_number) = extract_order_number(normalized) {
                payload.insert("orderNumber".to_string(), Value::String(order_number));
            }
            if let Some(email) = extract_email(raw) {
                payload.insert("email".to_string(), Value::String(email));
            }
        }
        Intent::SizingRepairs
        | Intent::CareWarranty
        | Intent::Financing
        | Intent::StylistContact
        | Intent::Csat => {}
    }
    Value::Object(payload)
}

fn has_usable_payload(intent: Intent, payload: &Value) -> bool {
    match intent {
        Intent::FindProduct => payload
            .get("filters")
            .and_then(Value::as_object)
            .is_some_and(|filters| !filters.is_empty()),
        Intent::TrackOrder | Intent::ReturnExchange => {
            payload.get("orderNumber").is_some() || payload.get("email").is_some()
        }
        _ => false,
    }
}

type Pattern = OnceLock<Option<Regex>>;

fn compiled(cell: &'static Pattern, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::error!(%pattern, error = %err, "classifier pattern failed to compile");
            None
        }
    })
    .as_ref()
}

fn first_capture(re: Option<&Regex>, haystack: &str) -> Option<String> {
    re?.captures(haystack)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

fn extract_order_number(normalized: &str) -> Option<String> {
    static EXPLICIT: Pattern = OnceLock::new();
    static BARE: Pattern = OnceLock::new();
    let explicit = compiled(
        &EXPLICIT,
        r"(?:order\s*(?:number|no|num)?\s*#?\s*|#)([a-z]{0,3}-?\d{3,})",
    );
    first_capture(explicit, normalized)
        .map(|order| order.to_uppercase())
        .or_else(|| first_capture(compiled(&BARE, r"\b(\d{5,})\b"), normalized))
}

fn extract_email(raw: &str) -> Option<String> {
    static EMAIL: Pattern = OnceLock::new();
    let email = compiled(&EMAIL, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+")?;
    email.find(raw).map(|m| m.as_str().to_lowercase())
}

fn parse_amount(value: &str) -> Option<f64> {
    value.replace(',', "").parse::<f64>().ok()
}

fn extract_filters(raw: &str, normalized: &str) -> Vec<(String, Value)> {
    static RANGE: Pattern = OnceLock::new();
    static MAX: Pattern = OnceLock::new();
    static MIN: Pattern = OnceLock::new();

    // Prices are read from the raw text so thousands separators survive.
    let lowered = raw.to_lowercase();
    let mut filters = Vec::new();
    let range = compiled(
        &RANGE,
        r"\$\s*(\d[\d,]*)\s*(?:-|to)\s*\$?\s*(\d[\d,]*)",
    )
    .and_then(|re| re.captures(&lowered));
    let max = compiled(
        &MAX,
        r"(?:under|below|less than|max|up to)\s*\$?\s*(\d[\d,]*)",
    );
    let min = compiled(
        &MIN,
        r"(?:over|above|more than|at least|min)\s*\$?\s*(\d[\d,]*)",
    );

    if let Some(caps) = range {
        let low = caps.get(1).and_then(|m| parse_amount(m.as_str()));
        let high = caps.get(2).and_then(|m| parse_amount(m.as_str()));
        if let (Some(low), Some(high)) = (low, high) {
            filters.push(("minPrice".to_string(), json!(low.min(high))));
            filters.push(("maxPrice".to_string(), json!(low.max(high))));
        }
    } else {
        if let Some(amount) = first_capture(max, &lowered).and_then(|m| parse_amount(&m)) {
            filters.push(("maxPrice".to_string(), json!(amount)));
        }
        if let Some(amount) = first_capture(min, &lowered).and_then(|m| parse_amount(&m)) {
            filters.push(("minPrice".to_string(), json!(amount)));
        }
    }

    let padded = format!(" {normalized} ");
    if let Some(metal) = METALS
        .iter()
        .find(|metal| padded.contains(&format!(" {metal} ")))
    {
        filters.push(("metal".to_string(), json!(metal)));
    }

    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if let Some((_, category)) = CATEGORIES
        .iter()
        .find(|(stem, _)| tokens.iter().any(|token| token_matches(token, stem)))
    {
        filters.push(("category".to_string(), json!(category)));
    }

    if padded.contains(" ready to ship ") || padded.contains(" in stock ") {
        filters.push(("availability".to_string(), json!("ready-to-ship")));
    }

    filters
}
