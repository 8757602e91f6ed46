//! Well-known directories.

use std::path::PathBuf;

/// Application directory name under the platform config dir.
const APP_NAME: &str = "souk";

/// Overrides the platform config directory when set.
/// Useful for testing and running several identities side by side.
const CONFIG_DIR_ENV: &str = "SOUK_CONFIG_DIR";

/// Get the config directory for souk.
///
/// Checks `SOUK_CONFIG_DIR` first, then falls back to the platform default
/// (`~/.config/souk` on Linux, `~/Library/Application Support/souk` on macOS).
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Directory holding persisted chat session state.
pub fn state_dir() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join("state"))
}

/// Directory for rolling log files.
pub fn log_dir() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join("logs"))
}
