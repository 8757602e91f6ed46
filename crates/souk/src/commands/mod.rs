//! CLI command handlers.

pub mod chat;
pub mod config;
pub mod conversations;
pub mod send;
pub mod thread;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use console::Style;
use souk_cache::CacheConfig;
use souk_client::{Message, SoukClient};
use souk_config::ClientConfig;

/// Server used when neither the flag nor a context names one.
const DEFAULT_SERVER: &str = "http://localhost:5000";

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Server URL to connect to.
    pub server_url: String,
    /// Explicit push channel URL, if the context sets one.
    pub push_url: Option<String>,
    /// Authenticated user.
    pub user_id: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Query cache settings.
    pub cache: CacheConfig,
    /// Where the last chat session is remembered.
    pub state_dir: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Build the context from flags and the client config file.
    pub fn resolve(
        server: Option<String>,
        context_name: Option<&str>,
        json_output: bool,
        verbose: bool,
    ) -> Result<Self> {
        let config = ClientConfig::load().context("Failed to load client config")?;
        let selected = config.context(context_name)?;

        let defaults = &config.defaults;
        let mut cache = CacheConfig::new().with_max_entries(defaults.max_cached_queries);
        if defaults.stale_time_secs > 0 {
            cache = cache.with_stale_time(Duration::from_secs(defaults.stale_time_secs));
        }

        let token = match selected {
            Some(c) => c.bearer_token()?,
            None => None,
        };
        let server_url = server
            .or_else(|| selected.map(|c| c.server.clone()))
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let timeout = config.timeout_secs(selected);

        Ok(Self {
            server_url,
            push_url: selected.and_then(|c| c.push_url.clone()),
            user_id: selected.and_then(|c| c.user_id.clone()),
            token,
            timeout: Duration::from_secs(timeout),
            cache,
            state_dir: souk_config::state_dir().unwrap_or_else(|| PathBuf::from("state")),
            json_output,
            verbose,
        })
    }

    /// The authenticated user, or an error explaining how to set one.
    pub fn require_user(&self) -> Result<&str> {
        self.user_id.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No user configured. Set one with: souk config set-context <name> --user <id>"
            )
        })
    }

    /// HTTP client for the configured server.
    pub fn client(&self) -> Result<Arc<SoukClient>> {
        let mut builder = SoukClient::builder()
            .base_url(&self.server_url)
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            builder = builder.auth_token(token);
        }
        Ok(Arc::new(builder.build().with_context(|| {
            format!("Invalid server URL: {}", self.server_url)
        })?))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Print one message as `HH:MM name: content`, with its product below.
pub(crate) fn print_message(message: &Message, me: Option<&str>) {
    let dim = Style::new().dim();
    let (name, style) = if me == Some(message.sender.id.as_str()) {
        ("You".to_string(), Style::new().green().bold())
    } else {
        (message.sender.name.clone(), Style::new().cyan().bold())
    };

    println!(
        "{} {} {}",
        dim.apply_to(message.created_at.format("%H:%M")),
        style.apply_to(format!("{}:", name)),
        message.content
    );

    if let Some(product) = &message.product {
        let mut line = product
            .title
            .clone()
            .or_else(|| product.product_id.clone())
            .unwrap_or_else(|| "product".to_string());
        if let Some(price) = product.price {
            line.push_str(&format!(" · {:.2}", price));
        }
        println!("      {}", dim.apply_to(format!("↳ {}", line)));
    }
}

/// Truncate to `max` characters, adding an ellipsis when cut.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 6), "hello…");
        assert_eq!(truncate("héllo wörld", 6), "héllo…");
    }
}
