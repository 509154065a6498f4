//! API keys shared between devstack-launched services.
//!
//! The gateway container and its HTTP clients must use the same plain-text
//! key. A key that is missing, too short, or stored in hashed form
//! (`sha512:…`) is replaced by a fresh one before anything starts.

use crate::env_file::EnvFile;
use crate::error::Result;

const MIN_KEY_LEN: usize = 16;
const HASHED_PREFIX: &str = "sha512:";

/// 32 lowercase hex characters (a v4 UUID without hyphens).
pub fn generate_api_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn is_usable_key(value: &str) -> bool {
    value.len() >= MIN_KEY_LEN && !value.starts_with(HASHED_PREFIX)
}

/// Make sure `key` holds a usable API key, writing a new one if not.
/// Returns the generated key, or `None` when the stored one was kept.
pub fn ensure_api_key(store: &mut EnvFile, key: &str) -> Result<Option<String>> {
    if store.get(key).is_some_and(is_usable_key) {
        return Ok(None);
    }
    let fresh = generate_api_key();
    store.upsert(key, &fresh)?;
    tracing::info!(key, "generated new API key");
    Ok(Some(fresh))
}

/// First characters of a secret, for logs and terminal output.
pub fn redact(value: &str) -> String {
    let shown: String = value.chars().take(8).collect();
    format!("{shown}…")
}
