//! Vacancy filtering rules
//!
//! Pure decisions over collected vacancies. Rules are checked in order and the
//! first match wins: company blacklist, title blacklist, title whitelist,
//! description blacklist, language, duplicate.

use std::collections::HashSet;

use crate::models::{FilterSettings, Vacancy};

/// Outcome for one vacancy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    Skip(String),
}

/// Stateful filter for one filtering pass
///
/// Only duplicate detection carries state; every other rule is a pure predicate.
pub struct FilterEngine {
    company_blacklist: Vec<String>,
    title_blacklist: Vec<String>,
    title_whitelist: Vec<String>,
    description_blacklist: Vec<String>,
    require_cyrillic: bool,
    remove_duplicates: bool,
    seen: HashSet<(String, String)>,
}

impl FilterEngine {
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            company_blacklist: lowered(&settings.company_blacklist),
            title_blacklist: lowered(&settings.title_blacklist),
            title_whitelist: lowered(&settings.title_whitelist),
            description_blacklist: lowered(&settings.description_blacklist),
            require_cyrillic: settings.require_cyrillic,
            remove_duplicates: settings.remove_duplicates,
            seen: HashSet::new(),
        }
    }

    /// Decide one vacancy; kept vacancies are remembered for duplicate detection
    pub fn evaluate(&mut self, vacancy: &Vacancy) -> FilterDecision {
        let company = vacancy.company.as_deref().unwrap_or("");

        if let Some(word) = first_match(company, &self.company_blacklist) {
            return FilterDecision::Skip(format!("company blacklist: {}", word));
        }
        if let Some(word) = first_match(&vacancy.title, &self.title_blacklist) {
            return FilterDecision::Skip(format!("title blacklist: {}", word));
        }
        if !self.title_whitelist.is_empty()
            && first_match(&vacancy.title, &self.title_whitelist).is_none()
        {
            return FilterDecision::Skip("title not in whitelist".to_string());
        }
        if let Some(word) = first_match(&vacancy.description, &self.description_blacklist) {
            return FilterDecision::Skip(format!("description blacklist: {}", word));
        }
        if self.require_cyrillic
            && ![company, vacancy.title.as_str(), vacancy.description.as_str()]
                .iter()
                .any(|text| contains_cyrillic(text))
        {
            return FilterDecision::Skip("no Russian or Ukrainian text".to_string());
        }
        if self.remove_duplicates {
            let key = (company.trim().to_lowercase(), vacancy.title.trim().to_lowercase());
            if !self.seen.insert(key) {
                return FilterDecision::Skip("duplicate company and title".to_string());
            }
        }

        FilterDecision::Keep
    }

    /// Seed duplicate detection with a vacancy kept by an earlier pass
    pub fn remember(&mut self, vacancy: &Vacancy) {
        if self.remove_duplicates {
            let company = vacancy.company.as_deref().unwrap_or("");
            self.seen
                .insert((company.trim().to_lowercase(), vacancy.title.trim().to_lowercase()));
        }
    }
}

fn lowered(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// First word contained in `text` (case-insensitive substring)
fn first_match<'a>(text: &str, words: &'a [String]) -> Option<&'a str> {
    if text.is_empty() || words.is_empty() {
        return None;
    }
    let text = text.to_lowercase();
    words
        .iter()
        .find(|w| text.contains(w.as_str()))
        .map(String::as_str)
}

/// Russian and Ukrainian letters
pub fn contains_cyrillic(text: &str) -> bool {
    text.chars().any(|c| {
        let c = c.to_lowercase().next().unwrap_or(c);
        matches!(c, 'а'..='я' | 'ё' | 'і' | 'ї' | 'є' | 'ґ')
    })
}
