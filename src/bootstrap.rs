//! Bootstrap helpers for Farmhand.
//!
//! Account tokens and the webhook URL are secrets and never live in the
//! TOML settings file. They come from the process environment, a `./.env`
//! file, or `~/.farmhand/.env` (standard dotenvy format).

use std::path::{Path, PathBuf};

/// Path to the Farmhand-specific `.env` file: `~/.farmhand/.env`.
pub fn farmhand_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".farmhand")
        .join(".env")
}

/// Load env vars from `~/.farmhand/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority over `~/.farmhand/.env`. dotenvy never overwrites
/// existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.farmhand/.env`
pub fn load_farmhand_env() {
    load_env_file(&farmhand_env_path());
}

/// Load one dotenv file if present. Unreadable files are reported and skipped.
pub(crate) fn load_env_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!("Loaded env file {}", path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Failed to load env file {}: {}", path.display(), e);
            false
        }
    }
}
