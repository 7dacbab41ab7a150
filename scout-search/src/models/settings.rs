//! Search session settings
//!
//! Supplied by the caller when a session starts (and optionally replaced on
//! resume). Every field has a serde default so partial JSON bodies are accepted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Settings of one multi-stage search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Search terms, one scrape per (source, position) pair
    #[serde(default)]
    pub positions: Vec<String>,

    /// Source name → enabled flag
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, bool>,

    /// Results requested per (source, position) scrape (default: 100)
    #[serde(default = "default_results_wanted")]
    pub results_wanted: u32,

    /// Maximum posting age in hours (default: 168, one week)
    #[serde(default = "default_hours_old")]
    pub hours_old: Option<u32>,

    /// Filtering rules
    #[serde(default)]
    pub filters: FilterSettings,

    /// LLM enrichment rules
    #[serde(default)]
    pub llm: LlmSettings,

    /// Markdown export after completion (disabled when absent)
    #[serde(default)]
    pub export: Option<ExportSettings>,
}

/// Filtering rules applied in the filtering stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Country whitelist; only the first entry is used as the scrape location
    #[serde(default)]
    pub countries: Vec<String>,

    /// Company names to drop (case-insensitive substring)
    #[serde(default)]
    pub company_blacklist: Vec<String>,

    /// Title words to drop (case-insensitive substring)
    #[serde(default)]
    pub title_blacklist: Vec<String>,

    /// If non-empty, titles must contain at least one of these
    #[serde(default)]
    pub title_whitelist: Vec<String>,

    /// Description words to drop (case-insensitive substring)
    #[serde(default)]
    pub description_blacklist: Vec<String>,

    /// Keep only postings containing Russian/Ukrainian text (default: false)
    #[serde(default)]
    pub require_cyrillic: bool,

    /// Drop repeated (company, title) pairs, first wins (default: true)
    #[serde(default = "default_true")]
    pub remove_duplicates: bool,
}

/// LLM enrichment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Run the enrichment stage (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// OpenAI API key; stripped from every snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat model (default: gpt-4o-mini)
    #[serde(default = "default_model")]
    pub model: String,

    /// Free-form candidate profile / evaluation rules sent as system context
    #[serde(default)]
    pub rules: String,

    /// Sampling temperature (default: 0.2)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token cap per vacancy (default: 600)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Markdown export destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Directory receiving new vacancy files
    pub vacancy_dir: PathBuf,

    /// Files already rejected by the user; matching names are never exported
    #[serde(default)]
    pub skip_dir: Option<PathBuf>,

    /// Files the user is already working on; matching names are never exported
    #[serde(default)]
    pub current_dir: Option<PathBuf>,
}

impl SearchSettings {
    /// Enabled source names in deterministic order
    pub fn enabled_sources(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Location hint for scrapers: the first configured country only
    pub fn location_hint(&self) -> Option<&str> {
        self.filters
            .countries
            .first()
            .map(String::as_str)
            .filter(|c| !c.trim().is_empty())
    }

    /// Copy with every secret removed
    pub fn sanitized(&self) -> Self {
        let mut clean = self.clone();
        clean.llm.api_key = None;
        clean
    }

    /// True when any secret is present
    pub fn has_secrets(&self) -> bool {
        self.llm
            .api_key
            .as_deref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            sources: default_sources(),
            results_wanted: default_results_wanted(),
            hours_old: default_hours_old(),
            filters: FilterSettings::default(),
            llm: LlmSettings::default(),
            export: None,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            countries: Vec::new(),
            company_blacklist: Vec::new(),
            title_blacklist: Vec::new(),
            title_whitelist: Vec::new(),
            description_blacklist: Vec::new(),
            require_cyrillic: false,
            remove_duplicates: default_true(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: default_model(),
            rules: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

// Default value functions
fn default_sources() -> BTreeMap<String, bool> {
    BTreeMap::from([("linkedin".to_string(), true), ("indeed".to_string(), true)])
}

fn default_results_wanted() -> u32 {
    100
}

fn default_hours_old() -> Option<u32> {
    Some(7 * 24)
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: SearchSettings =
            serde_json::from_str(r#"{"positions": ["devops engineer"]}"#).unwrap();
        assert_eq!(settings.positions, vec!["devops engineer".to_string()]);
        assert_eq!(settings.results_wanted, 100);
        assert_eq!(settings.hours_old, Some(168));
        assert_eq!(settings.enabled_sources(), vec!["indeed", "linkedin"]);
        assert!(settings.filters.remove_duplicates);
        assert!(!settings.llm.enabled);
    }

    #[test]
    fn test_enabled_sources_skips_disabled() {
        let settings: SearchSettings = serde_json::from_str(
            r#"{"sources": {"linkedin": true, "indeed": false, "glassdoor": true}}"#,
        )
        .unwrap();
        assert_eq!(settings.enabled_sources(), vec!["glassdoor", "linkedin"]);
    }

    #[test]
    fn test_location_hint_uses_first_country_only() {
        let mut settings = SearchSettings::default();
        settings.filters.countries = vec!["Latvia".to_string(), "Cyprus".to_string()];
        assert_eq!(settings.location_hint(), Some("Latvia"));

        settings.filters.countries.clear();
        assert_eq!(settings.location_hint(), None);
    }

    #[test]
    fn test_sanitized_drops_api_key() {
        let mut settings = SearchSettings::default();
        settings.llm.api_key = Some("sk-secret".to_string());
        assert!(settings.has_secrets());

        let clean = settings.sanitized();
        assert!(clean.llm.api_key.is_none());
        assert!(!clean.has_secrets());
        assert!(!serde_json::to_string(&clean).unwrap().contains("sk-secret"));
    }
}
