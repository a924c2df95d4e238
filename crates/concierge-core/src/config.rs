use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ConciergeConfig {
    pub backend: BackendConfig,
    pub classifier: ClassifierConfig,
    pub disambiguation: DisambiguationConfig,
    pub storefront: StorefrontConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// When unset, the shortlist and order-update calls are not attempted.
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub execute_threshold: f32,
    pub ambiguous_threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            execute_threshold: 0.7,
            ambiguous_threshold: 0.5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DisambiguationConfig {
    pub escalate_after: u32,
}

impl Default for DisambiguationConfig {
    fn default() -> Self {
        Self { escalate_after: 2 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorefrontConfig {
    pub origin: String,
    pub product_path_prefix: String,
    pub cart_path: String,
    pub shortlist_share_path: String,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            product_path_prefix: "/products/".to_string(),
            cart_path: "/cart".to_string(),
            shortlist_share_path: "/shortlist".to_string(),
        }
    }
}

impl StorefrontConfig {
    pub fn product_url(&self, slug: &str) -> String {
        format!(
            "{}{}{}",
            self.origin.trim_end_matches('/'),
            self.product_path_prefix,
            slug
        )
    }

    pub fn cart_url(&self) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), self.cart_path)
    }

    pub fn shortlist_url(&self, ids: &[&str]) -> String {
        format!(
            "{}{}?items={}",
            self.origin.trim_end_matches('/'),
            self.shortlist_share_path,
            ids.join(",")
        )
    }
}
