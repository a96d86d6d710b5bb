//! Environment-driven configuration helpers shared by every runtime component.
//!
//! Keys may be profiled: when `TICKFORGE_PROFILE` is set (e.g. `PROD`), each
//! key is first looked up as `{PROFILE}_{KEY}` and falls back to `{KEY}`.

use std::env;
use std::str::FromStr;

/// Env var naming the active configuration profile.
pub const PROFILE_ENV: &str = "TICKFORGE_PROFILE";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Active profile name, upper-cased (empty = default).
pub fn active_profile() -> String {
    env_or(PROFILE_ENV, "").to_uppercase()
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
pub fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

pub fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

/// Parse a profiled env var, keeping `default` when unset or unparsable.
pub fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable config value");
                default
            }
        },
        None => default,
    }
}
