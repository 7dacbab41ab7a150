//! Collected job postings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Pipeline status of one vacancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VacancyStatus {
    Collected,
    Filtered,
    Enriched,
    Skipped,
}

impl std::str::FromStr for VacancyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "collected" => Ok(VacancyStatus::Collected),
            "filtered" => Ok(VacancyStatus::Filtered),
            "enriched" => Ok(VacancyStatus::Enriched),
            "skipped" => Ok(VacancyStatus::Skipped),
            other => Err(format!("unknown vacancy status: {}", other)),
        }
    }
}

/// Structured fields produced by the enrichment stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFields {
    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub seniority: Option<String>,

    #[serde(default)]
    pub remote_policy: Option<String>,

    #[serde(default)]
    pub salary_range: Option<String>,

    #[serde(default)]
    pub tech_stack: Vec<String>,

    /// Fit against the session's rules (0.0 - 1.0)
    #[serde(default)]
    pub relevance_score: f32,

    #[serde(default)]
    pub match_reasons: Vec<String>,

    /// Model that produced these fields
    #[serde(default)]
    pub model: String,
}

/// One collected job posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vacancy {
    pub id: Uuid,
    pub session_id: String,
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub description: String,
    pub url: String,
    /// Source (scraper) name
    pub source: String,
    /// Search term that produced this vacancy
    pub search_position: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub status: VacancyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Source-specific fields, passed through untouched
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentFields>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vacancy {
    /// Mark as surviving the filtering stage
    pub fn mark_filtered(&mut self) {
        self.status = VacancyStatus::Filtered;
        self.skip_reason = None;
        self.updated_at = Utc::now();
    }

    /// Mark as dropped by the filtering stage
    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = VacancyStatus::Skipped;
        self.skip_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Attach LLM output
    pub fn apply_enrichment(&mut self, fields: EnrichmentFields) {
        self.enrichment = Some(fields);
        self.status = VacancyStatus::Enriched;
        self.updated_at = Utc::now();
    }

    /// Company name or "Unknown"
    pub fn company_or_unknown(&self) -> &str {
        self.company
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("Unknown")
    }

    /// Posting date as reported by the source, if any
    pub fn date_posted(&self) -> Option<&str> {
        self.data.get("date_posted").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vacancy() -> Vacancy {
        Vacancy {
            id: Uuid::new_v4(),
            session_id: "s".to_string(),
            title: "Platform Engineer".to_string(),
            company: None,
            description: String::new(),
            url: "https://example.com/1".to_string(),
            source: "linkedin".to_string(),
            search_position: "platform engineer".to_string(),
            country: None,
            location: None,
            status: VacancyStatus::Collected,
            skip_reason: None,
            data: BTreeMap::new(),
            enrichment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_transitions() {
        let mut v = vacancy();
        v.mark_skipped("title blacklist: Junior");
        assert_eq!(v.status, VacancyStatus::Skipped);
        assert_eq!(v.skip_reason.as_deref(), Some("title blacklist: Junior"));

        v.mark_filtered();
        assert_eq!(v.status, VacancyStatus::Filtered);
        assert!(v.skip_reason.is_none());

        v.apply_enrichment(EnrichmentFields::default());
        assert_eq!(v.status, VacancyStatus::Enriched);
        assert!(v.enrichment.is_some());
    }

    #[test]
    fn test_company_fallback() {
        let mut v = vacancy();
        assert_eq!(v.company_or_unknown(), "Unknown");
        v.company = Some("Acme".to_string());
        assert_eq!(v.company_or_unknown(), "Acme");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Enriched".parse::<VacancyStatus>(), Ok(VacancyStatus::Enriched));
        assert!("bogus".parse::<VacancyStatus>().is_err());
    }
}
