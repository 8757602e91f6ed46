//! The `client.yaml` file: named contexts plus shared defaults.
//!
//! ```yaml
//! current-context: staging
//!
//! contexts:
//!   - name: local
//!     server: http://localhost:5000
//!     user-id: 64f0c0ffee
//!   - name: staging
//!     server: https://api.staging.souk.example
//!     user-id: 650badc0de
//!     token:
//!       env: SOUK_TOKEN
//!
//! defaults:
//!   timeout: 30
//!   stale-time-secs: 60
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

const CONFIG_FILE: &str = "client.yaml";

// ─────────────────────────────────────────────────────────────────────────────
// File
// ─────────────────────────────────────────────────────────────────────────────

/// Contents of `client.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Context used when none is named on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    pub contexts: Vec<Context>,

    pub defaults: ClientDefaults,
}

impl ClientConfig {
    /// Location of `client.yaml` in the config directory.
    pub fn path() -> Option<PathBuf> {
        crate::xdg_config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load from the default location. A missing file is an empty config.
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`. A missing file is an empty config.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::ReadFile {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()
            .ok_or_else(|| ConfigError::Other("could not determine config directory".to_string()))?;
        self.save_to(&path)
    }

    /// Save to `path`, creating parent directories. The previous file is
    /// replaced in one rename.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let write_err = |at: &Path, source: std::io::Error| ConfigError::WriteFile {
            path: at.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
        }
        let staged = path.with_extension("yaml.tmp");
        std::fs::write(&staged, self.to_yaml()?).map_err(|e| write_err(&staged, e))?;
        std::fs::rename(&staged, path).map_err(|e| write_err(path, e))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseYaml(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ParseYaml(e.to_string()))
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    /// Pick a context.
    ///
    /// A named context must exist. Without a name the current context is
    /// used, and a dangling `current-context` reads as no context at all.
    pub fn context(&self, name: Option<&str>) -> Result<Option<&Context>> {
        match name {
            Some(name) => self
                .find(name)
                .map(Some)
                .ok_or_else(|| ConfigError::ContextNotFound(name.to_string())),
            None => Ok(self.current_context.as_deref().and_then(|n| self.find(n))),
        }
    }

    /// Create the context `name` or patch an existing one.
    ///
    /// A new context needs a server. The first context ever added becomes
    /// current.
    pub fn apply(&mut self, name: &str, mut update: ContextUpdate) -> Result<ContextChange> {
        let created = match self.contexts.iter_mut().find(|c| c.name == name) {
            Some(context) => {
                update.apply_to(context);
                false
            }
            None => {
                let server = update.server.take().ok_or_else(|| ConfigError::MissingField {
                    field: "server".to_string(),
                    context: format!("new context '{}'", name),
                })?;
                let mut context = Context::new(name, server);
                update.apply_to(&mut context);
                self.contexts.push(context);
                true
            }
        };

        let became_current = self.current_context.is_none() && self.contexts.len() == 1;
        if became_current {
            self.current_context = Some(name.to_string());
        }
        Ok(ContextChange {
            created,
            became_current,
        })
    }

    /// Make `name` the current context.
    pub fn use_context(&mut self, name: &str) -> Result<()> {
        if self.find(name).is_none() {
            return Err(ConfigError::ContextNotFound(name.to_string()));
        }
        self.current_context = Some(name.to_string());
        Ok(())
    }

    /// Delete `name`, unsetting it as current if it was.
    pub fn remove_context(&mut self, name: &str) -> Option<Context> {
        let index = self.contexts.iter().position(|c| c.name == name)?;
        if self.current_context.as_deref() == Some(name) {
            self.current_context = None;
        }
        Some(self.contexts.remove(index))
    }

    /// Request timeout in seconds, falling back to the defaults.
    pub fn timeout_secs(&self, context: Option<&Context>) -> u64 {
        context
            .and_then(|c| c.timeout)
            .unwrap_or(self.defaults.timeout)
    }

    fn find(&self, name: &str) -> Option<&Context> {
        self.contexts.iter().find(|c| c.name == name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// A marketplace backend plus the identity used to chat on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Context {
    pub name: String,

    /// Base URL of the backend, e.g. `http://localhost:5000`.
    pub server: String,

    /// User this context chats as. Persisted chat state only restores for
    /// the same user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenSource>,

    /// Push channel URL. Derived from `server` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Context {
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            user_id: None,
            token: None,
            push_url: None,
            timeout: None,
        }
    }

    /// The bearer token, if one is configured and available.
    pub fn bearer_token(&self) -> Result<Option<String>> {
        match &self.token {
            Some(source) => source.resolve(),
            None => Ok(None),
        }
    }
}

/// Fields to change on a context. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub server: Option<String>,
    pub user_id: Option<String>,
    pub token: Option<TokenSource>,
    pub push_url: Option<String>,
    pub timeout: Option<u64>,
}

impl ContextUpdate {
    fn apply_to(self, context: &mut Context) {
        if let Some(server) = self.server {
            context.server = server;
        }
        if self.user_id.is_some() {
            context.user_id = self.user_id;
        }
        if self.token.is_some() {
            context.token = self.token;
        }
        if self.push_url.is_some() {
            context.push_url = self.push_url;
        }
        if self.timeout.is_some() {
            context.timeout = self.timeout;
        }
    }
}

/// What [`ClientConfig::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextChange {
    pub created: bool,
    pub became_current: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────────────

/// Where a context's bearer token (the marketplace JWT) comes from.
///
/// The file wins when both are set and the file exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TokenSource {
    /// File holding the token. A leading `~/` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Environment variable holding the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl TokenSource {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            env: None,
        }
    }

    pub fn from_env(var: impl Into<String>) -> Self {
        Self {
            file: None,
            env: Some(var.into()),
        }
    }

    /// Read the token. A missing file or unset variable is not an error.
    pub fn resolve(&self) -> Result<Option<String>> {
        if let Some(path) = &self.file {
            let path = expand_home(path);
            match std::fs::read_to_string(&path) {
                Ok(token) => return Ok(non_empty(token.trim())),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ConfigError::ReadFile {
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }
        Ok(self
            .env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .and_then(|token| non_empty(token.trim())))
    }
}

fn non_empty(token: &str) -> Option<String> {
    (!token.is_empty()).then(|| token.to_string())
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Settings shared by every context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientDefaults {
    /// Request timeout in seconds.
    pub timeout: u64,

    /// Age in seconds after which a cached query is refetched when viewed.
    /// Zero turns time-based staleness off.
    pub stale_time_secs: u64,

    /// Upper bound on cached queries.
    pub max_cached_queries: usize,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            timeout: 30,
            stale_time_secs: 0,
            max_cached_queries: 256,
        }
    }
}
