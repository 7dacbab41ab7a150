//! Markdown export of surviving vacancies
//!
//! One file per vacancy, named `"{company} - {title} - {source}.md"`. Names
//! already present in the skip directory (rejected) or the current directory
//! (in progress) are never exported again, and existing files are never
//! overwritten.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::models::{ExportSettings, Vacancy, VacancyStatus};

/// Counters of one export run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub written: usize,
    /// Name listed in the skip or current directory
    pub skipped_listed: usize,
    /// File already present in the vacancy directory
    pub skipped_existing: usize,
    pub errors: Vec<String>,
}

/// Write filtered and enriched vacancies as markdown files
///
/// I/O problems are collected in the report; only an unusable vacancy
/// directory aborts the run.
pub async fn export_vacancies(settings: &ExportSettings, vacancies: &[Vacancy]) -> ExportReport {
    let mut report = ExportReport::default();

    if let Err(e) = tokio::fs::create_dir_all(&settings.vacancy_dir).await {
        report.errors.push(format!(
            "cannot create {}: {}",
            settings.vacancy_dir.display(),
            e
        ));
        return report;
    }

    let mut listed = HashSet::new();
    for dir in [&settings.skip_dir, &settings.current_dir].into_iter().flatten() {
        match file_names(dir).await {
            Ok(names) => listed.extend(names),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot list directory, ignoring it");
            }
        }
    }

    for vacancy in vacancies
        .iter()
        .filter(|v| matches!(v.status, VacancyStatus::Filtered | VacancyStatus::Enriched))
    {
        let name = export_file_name(vacancy);
        if listed.contains(&name) {
            tracing::debug!(file = %name, "Skipping listed vacancy");
            report.skipped_listed += 1;
            continue;
        }

        let path = settings.vacancy_dir.join(&name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            report.skipped_existing += 1;
            continue;
        }

        match tokio::fs::write(&path, vacancy_to_markdown(vacancy)).await {
            Ok(()) => report.written += 1,
            Err(e) => report.errors.push(format!("{}: {}", name, e)),
        }
    }

    tracing::info!(
        dir = %settings.vacancy_dir.display(),
        written = report.written,
        skipped_listed = report.skipped_listed,
        skipped_existing = report.skipped_existing,
        errors = report.errors.len(),
        "Markdown export finished"
    );
    report
}

async fn file_names(dir: &Path) -> std::io::Result<HashSet<String>> {
    let mut names = HashSet::new();
    if !tokio::fs::try_exists(dir).await? {
        return Ok(names);
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// `"{company} - {title} - {source}.md"` with path-hostile characters removed
pub fn export_file_name(vacancy: &Vacancy) -> String {
    let raw = format!(
        "{} - {} - {}",
        vacancy.company_or_unknown(),
        vacancy.title,
        vacancy.source
    );
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\r'))
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    format!("{}.md", cleaned.trim())
}

/// Trim trailing spaces, drop blank edges and collapse runs of blank lines
pub fn clean_description(description: &str) -> String {
    let lines: Vec<&str> = description.lines().map(str::trim_end).collect();

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);

    let mut result: Vec<&str> = Vec::new();
    let mut previous_empty = false;
    for &line in &lines[start..end] {
        let empty = line.is_empty();
        if !(empty && previous_empty) {
            result.push(line);
        }
        previous_empty = empty;
    }
    result.join("\n")
}

pub fn vacancy_to_markdown(vacancy: &Vacancy) -> String {
    let today = Utc::now().format("%Y-%m-%d");
    let mut out = format!(
        "# {} - {}\n\n\
         - URL: {}\n\
         - Company: {}\n\
         - Position: {}\n\
         - Location: {}\n\
         - Source: {}\n\
         - Search: {}\n\
         - Posted: {}\n\
         - Exported: {}\n\
         - Status: New\n",
        vacancy.company_or_unknown(),
        vacancy.title,
        vacancy.url,
        vacancy.company.as_deref().unwrap_or(""),
        vacancy.title,
        vacancy.location.as_deref().unwrap_or(""),
        vacancy.source,
        vacancy.search_position,
        vacancy.date_posted().unwrap_or(""),
        today,
    );

    if let Some(enrichment) = &vacancy.enrichment {
        out.push_str("\n## Assessment\n\n");
        out.push_str(&format!("- Relevance: {:.2}\n", enrichment.relevance_score));
        if let Some(seniority) = &enrichment.seniority {
            out.push_str(&format!("- Seniority: {}\n", seniority));
        }
        if let Some(remote) = &enrichment.remote_policy {
            out.push_str(&format!("- Remote: {}\n", remote));
        }
        if let Some(salary) = &enrichment.salary_range {
            out.push_str(&format!("- Salary: {}\n", salary));
        }
        if !enrichment.tech_stack.is_empty() {
            out.push_str(&format!("- Stack: {}\n", enrichment.tech_stack.join(", ")));
        }
        if !enrichment.summary.is_empty() {
            out.push_str(&format!("\n{}\n", enrichment.summary));
        }
        for reason in &enrichment.match_reasons {
            out.push_str(&format!("- {}\n", reason));
        }
    }

    out.push_str("\n## Description\n\n");
    out.push_str(&clean_description(&vacancy.description));
    out.push_str("\n\n");
    out
}
