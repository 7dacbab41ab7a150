//! Scraper capability
//!
//! The collection scheduler treats every job source as a black box behind the
//! [`Scraper`] trait. Jobs come back as loosely-typed JSON objects; fields are
//! interpreted by [`JobPost::from_value`], everything else is passed through
//! into the vacancy's opaque data map.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Scraper errors
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Input of one scrape call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperInput {
    pub search_term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_remote: Option<bool>,
    pub results_wanted: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_old: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub easy_apply: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_format: Option<String>,
}

impl ScraperInput {
    pub fn new(search_term: impl Into<String>, results_wanted: u32) -> Self {
        Self {
            search_term: search_term.into(),
            location: None,
            country: None,
            is_remote: None,
            results_wanted,
            job_type: None,
            hours_old: None,
            easy_apply: None,
            description_format: None,
        }
    }
}

/// Result of one scrape call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeOutput {
    #[serde(default)]
    pub jobs: Vec<Value>,
}

/// Job source adapter
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Source name matched against the session's enabled sources
    fn name(&self) -> &str;

    /// Whether the source can currently be scraped
    async fn check_availability(&self) -> bool;

    /// Run one search
    async fn scrape(&self, input: &ScraperInput) -> Result<ScrapeOutput, ScraperError>;
}

/// Shared scraper handle
pub type SharedScraper = Arc<dyn Scraper>;

/// Interpreted fields of one scraped job
#[derive(Debug, Clone, PartialEq)]
pub struct JobPost {
    pub title: String,
    pub company: Option<String>,
    pub description: String,
    pub url: String,
    pub location: Option<String>,
    pub country: Option<String>,
    /// Every field of the original object
    pub data: BTreeMap<String, Value>,
}

impl JobPost {
    /// Interpret a scraped JSON object; `None` when title or url is missing
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let title = non_empty_str(object, "title")?;
        let url = non_empty_str(object, "job_url").or_else(|| non_empty_str(object, "url"))?;

        let (location, country) = match object.get("location") {
            Some(Value::Object(loc)) => {
                let parts: Vec<&str> = ["city", "state", "country"]
                    .iter()
                    .filter_map(|k| loc.get(*k).and_then(Value::as_str))
                    .filter(|s| !s.trim().is_empty())
                    .collect();
                let location = (!parts.is_empty()).then(|| parts.join(", "));
                let country = loc
                    .get("country")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (location, country)
            }
            Some(Value::String(s)) if !s.trim().is_empty() => (Some(s.clone()), None),
            _ => (None, None),
        };
        let country = country.or_else(|| non_empty_str(object, "country"));

        Some(Self {
            title,
            company: non_empty_str(object, "company"),
            description: non_empty_str(object, "description").unwrap_or_default(),
            url,
            location,
            country,
            data: object.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }
}

fn non_empty_str(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
