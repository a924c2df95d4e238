use std::io;
use std::io::Write;

use async_trait::async_trait;
use concierge_exec::CartClient;
use concierge_exec::HostBridge;
use concierge_exec::HostError;
use concierge_exec::OpenTarget;
use concierge_exec::ShareContent;

/// Terminal stand-in for the embedding page.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalHost;

#[async_trait]
impl HostBridge for TerminalHost {
    fn open_url(&self, url: &str, target: OpenTarget) -> Result<(), HostError> {
        let where_to = match target {
            OpenTarget::SameTab => "here",
            OpenTarget::NewTab => "in a new tab",
        };
        println!("  [open {where_to}] {url}");
        Ok(())
    }

    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || prompt_yes_no(&prompt))
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or(false)
    }

    async fn native_share(&self, _content: &ShareContent) -> Result<(), HostError> {
        Err(HostError::Unsupported("native share"))
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), HostError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|err| HostError::Failed(err.to_string()))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|err| HostError::Failed(err.to_string()))
    }
}

fn prompt_yes_no(prompt: &str) -> io::Result<bool> {
    print!("  {prompt} [y/N]: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes" | "YES"))
}

/// Accepts every add and echoes it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleCart;

#[async_trait]
impl CartClient for ConsoleCart {
    async fn add_item(&self, slug: &str, quantity: u32) -> bool {
        println!("  [cart] +{quantity} {slug}");
        true
    }
}
