//! Client configuration for Souk chat tools.
//!
//! Kubeconfig-style YAML with named connection contexts:
//! - Server URL, authenticated user and credentials per context
//! - `current-context` for default selection
//! - Shared defaults for timeouts and query caching
//!
//! Files live in the XDG config directory (`~/.config/souk` on Linux),
//! overridable with `SOUK_CONFIG_DIR`.

pub mod client;
pub mod error;
pub mod paths;

pub use client::{
    ClientConfig, ClientDefaults, Context, ContextChange, ContextUpdate, TokenSource,
};
pub use error::{ConfigError, Result};
pub use paths::{log_dir, state_dir, xdg_config_dir};
