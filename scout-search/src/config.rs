//! Configuration resolution for scout-search
//!
//! Provides multi-tier OpenAI API key resolution with Request → ENV → TOML priority.

use scout_common::{Error, Result};
use tracing::{debug, warn};

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Resolve the OpenAI API key for one session
///
/// **Priority:** Request settings → ENV → TOML
///
/// Called when a session starts or resumes with enrichment enabled.
pub fn resolve_openai_api_key(request_key: Option<&str>, toml_key: Option<&str>) -> Result<String> {
    let env_key = std::env::var(OPENAI_API_KEY_ENV).ok();

    let tiers = [
        ("request", request_key),
        ("environment", env_key.as_deref()),
        ("TOML", toml_key),
    ];

    let sources: Vec<&str> = tiers
        .iter()
        .filter(|(_, key)| key.map(is_valid_key).unwrap_or(false))
        .map(|(name, _)| *name)
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "OpenAI API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (name, key) in tiers {
        if let Some(key) = key.filter(|k| is_valid_key(k)) {
            debug!("OpenAI API key taken from {}", name);
            return Ok(key.trim().to_string());
        }
    }

    Err(Error::Config(format!(
        "OpenAI API key not configured. Enrichment needs one of:\n\
         1. Request: settings.llm.api_key\n\
         2. Environment: {}=sk-...\n\
         3. TOML config: ~/.config/vacancy-scout/config.toml (openai_api_key = \"sk-...\")",
        OPENAI_API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_request_key_wins() {
        std::env::set_var(OPENAI_API_KEY_ENV, "sk-env");
        let key = resolve_openai_api_key(Some("sk-request"), Some("sk-toml")).unwrap();
        std::env::remove_var(OPENAI_API_KEY_ENV);
        assert_eq!(key, "sk-request");
    }

    #[test]
    #[serial]
    fn test_env_before_toml() {
        std::env::set_var(OPENAI_API_KEY_ENV, "sk-env");
        let key = resolve_openai_api_key(Some("   "), Some("sk-toml")).unwrap();
        std::env::remove_var(OPENAI_API_KEY_ENV);
        assert_eq!(key, "sk-env");
    }

    #[test]
    #[serial]
    fn test_toml_fallback_and_missing() {
        std::env::remove_var(OPENAI_API_KEY_ENV);
        assert_eq!(resolve_openai_api_key(None, Some("sk-toml")).unwrap(), "sk-toml");
        assert!(matches!(resolve_openai_api_key(None, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("sk-1"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(" \t"));
    }
}
