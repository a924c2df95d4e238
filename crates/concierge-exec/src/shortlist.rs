use concierge_core::merge_into_shortlist;
use concierge_core::ModulePayload;
use concierge_core::ModuleType;
use concierge_core::ProductSummary;
use concierge_core::SessionPatch;
use serde_json::json;
use url::form_urlencoded::byte_serialize;
use url::Url;
use uuid::Uuid;

use crate::analytics::HOST_ACTION_FAILED;
use crate::analytics::SHORTLIST_CHECKOUT;
use crate::analytics::SHORTLIST_SHARED;
use crate::analytics::SHORTLIST_SYNC_FAILED;
use crate::backend::BackendError;
use crate::concierge::Concierge;
use crate::concierge::ProcessingGuard;
use crate::contracts::OpenTarget;
use crate::contracts::ShareContent;
use crate::contracts::ShortlistSync;

pub const SYNC_APOLOGY: &str =
    "I saved that here, but couldn't sync your shortlist just now. I'll try again on your next change.";
pub const CLEAR_PROMPT: &str = "Remove every piece from your shortlist?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMethod {
    Native,
    Clipboard,
    Mailto,
    Fallback,
}

impl ShareMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Clipboard => "clipboard",
            Self::Mailto => "mailto",
            Self::Fallback => "fallback",
        }
    }
}

impl Concierge {
    pub async fn shortlist_add(&self, product: ProductSummary) {
        let title = product.title.clone();
        self.with_store(|store| {
            let merged = merge_into_shortlist(&store.state().session.shortlist, product);
            store.update_session(SessionPatch {
                shortlist: Some(merged),
                ..SessionPatch::default()
            });
        });
        self.finish_sync(format!("Saved {title} to your shortlist."))
            .await;
    }

    pub async fn shortlist_remove(&self, product_id: &str) {
        let removed = self.with_store(|store| {
            let session = &store.state().session;
            if !session.shortlist_contains(product_id) {
                return false;
            }
            let remaining = session
                .shortlist
                .iter()
                .filter(|item| item.id != product_id)
                .cloned()
                .collect();
            store.update_session(SessionPatch {
                shortlist: Some(remaining),
                ..SessionPatch::default()
            });
            true
        });
        if !removed {
            self.say("That piece isn't on your shortlist.", None);
            return;
        }
        self.finish_sync("Removed it from your shortlist.".to_string())
            .await;
    }

    /// Asks the host to confirm first; a declined prompt changes nothing.
    pub async fn shortlist_clear(&self) {
        if self.shortlist_items().is_empty() {
            self.say("Your shortlist is already empty.", None);
            return;
        }
        if !self.host.confirm(CLEAR_PROMPT).await {
            tracing::debug!("shortlist clear declined");
            return;
        }
        self.with_store(|store| {
            store.update_session(SessionPatch {
                shortlist: Some(Vec::new()),
                ..SessionPatch::default()
            })
        });
        self.finish_sync("Your shortlist is cleared.".to_string())
            .await;
    }

    /// Native share, then clipboard, then a `mailto:` link, then a plain
    /// text module as the last resort.
    pub async fn shortlist_share(&self) {
        let items = self.shortlist_items();
        if items.is_empty() {
            self.say("Your shortlist is empty. Save a few pieces first.", None);
            return;
        }
        let content = self.share_content(&items);

        let method = if let Err(err) = self.host.native_share(&content).await {
            tracing::debug!(error = %err, "native share unavailable");
            let clipboard_text = format!("{}\n{}", content.text, content.url);
            if let Err(err) = self.host.copy_to_clipboard(&clipboard_text).await {
                tracing::debug!(error = %err, "clipboard unavailable");
                let opened = mailto_href(&content)
                    .map_err(|err| err.to_string())
                    .and_then(|href| {
                        self.host
                            .open_url(&href, OpenTarget::SameTab)
                            .map_err(|err| err.to_string())
                    });
                match opened {
                    Ok(()) => ShareMethod::Mailto,
                    Err(err) => {
                        tracing::debug!(error = %err, "mailto unavailable");
                        ShareMethod::Fallback
                    }
                }
            } else {
                ShareMethod::Clipboard
            }
        } else {
            ShareMethod::Native
        };

        match method {
            ShareMethod::Native => self.say("Shared your shortlist.", None),
            ShareMethod::Clipboard => {
                self.say("Copied your shortlist and link to the clipboard.", None)
            }
            ShareMethod::Mailto => self.say("Opened an email with your shortlist.", None),
            ShareMethod::Fallback => self.post_module(
                ModulePayload::new(ModuleType::ShareFallback)
                    .with("title", content.title.clone())
                    .with("text", content.text.clone())
                    .with("url", content.url.clone()),
                None,
            ),
        }
        self.track(
            SHORTLIST_SHARED,
            json!({ "method": method.as_str(), "count": items.len() }),
        );
    }

    /// Adds every item with a slug to the cart in order, then opens the cart.
    pub async fn shortlist_checkout(&self) {
        let items = self.shortlist_items();
        let slugs: Vec<String> = items.iter().filter_map(|item| item.slug.clone()).collect();
        let mut added = 0usize;
        for slug in &slugs {
            if self.cart.add_item(slug, 1).await {
                added += 1;
            } else {
                tracing::warn!(%slug, "cart rejected shortlist item");
            }
        }

        let summary = match (added, slugs.len()) {
            (_, 0) => "None of your shortlisted pieces can be added to the bag yet.".to_string(),
            (added, attempted) if added == attempted => {
                format!("Added {added} of {attempted} pieces to your bag.")
            }
            (added, attempted) => format!(
                "Added {added} of {attempted} pieces to your bag. The rest are unavailable right now."
            ),
        };
        self.say(summary, None);

        let cart_url = self.storefront.cart_url();
        if let Err(err) = self.host.open_url(&cart_url, OpenTarget::NewTab) {
            tracing::warn!(url = %cart_url, error = %err, "could not open cart");
            self.say(
                format!("I couldn't open your bag automatically. You can find it at {cart_url}."),
                None,
            );
            self.track(
                HOST_ACTION_FAILED,
                json!({ "action": "shortlist-checkout", "error": err.to_string() }),
            );
        }
        self.track(
            SHORTLIST_CHECKOUT,
            json!({ "added": added, "attempted": slugs.len(), "items": items.len() }),
        );
    }

    fn shortlist_items(&self) -> Vec<ProductSummary> {
        self.with_store(|store| store.state().session.shortlist.clone())
    }

    fn share_content(&self, items: &[ProductSummary]) -> ShareContent {
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        let text = items
            .iter()
            .map(|item| format!("{} (${:.2})", item.title, item.price))
            .collect::<Vec<_>>()
            .join("\n");
        ShareContent {
            title: "My shortlist".to_string(),
            text,
            url: self.storefront.shortlist_url(&ids),
        }
    }

    /// Syncs, then posts either the confirmation with a refreshed panel or
    /// the apology. Local state is kept either way.
    async fn finish_sync(&self, confirmation: String) {
        match self.sync_shortlist().await {
            Ok(()) => {
                let panel = ModulePayload::shortlist_panel(&self.shortlist_items());
                self.say(confirmation, None);
                self.post_module(panel, None);
            }
            Err(_) => self.say(SYNC_APOLOGY, None),
        }
    }

    async fn sync_shortlist(&self) -> Result<(), BackendError> {
        let _processing = ProcessingGuard::acquire(self);
        let request_id = Uuid::new_v4().to_string();
        let request = self.with_store(|store| {
            let session = &store.state().session;
            ShortlistSync {
                session_id: session.id.clone(),
                items: session.shortlist.clone(),
            }
        });

        let result = self.backend.sync_shortlist(&request, &request_id).await;
        let pending = result.is_err();
        self.with_store(|store| {
            if store.state().session.shortlist_sync_pending != pending {
                store.update_session(SessionPatch {
                    shortlist_sync_pending: Some(pending),
                    ..SessionPatch::default()
                });
            }
        });
        if let Err(err) = &result {
            tracing::warn!(%request_id, error = %err, "shortlist sync failed");
            self.track(
                SHORTLIST_SYNC_FAILED,
                json!({
                    "requestId": request_id,
                    "error": err.to_string(),
                    "items": request.items.len(),
                }),
            );
        }
        result
    }
}

fn encode_component(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn mailto_href(content: &ShareContent) -> Result<String, url::ParseError> {
    let mut href = Url::parse("mailto:")?;
    let body = format!("{}\n\n{}", content.text, content.url);
    href.set_query(Some(&format!(
        "subject={}&body={}",
        encode_component(&content.title),
        encode_component(&body)
    )));
    Ok(href.to_string())
}
