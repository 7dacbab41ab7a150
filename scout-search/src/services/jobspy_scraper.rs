//! HTTP scraper backed by a JobSpy-compatible scraping service
//!
//! One instance per site (linkedin, indeed, ...). Requests to the service are
//! paced with a token-bucket limiter shared by all calls of the instance.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::scraper::{ScrapeOutput, Scraper, ScraperError, ScraperInput};

const USER_AGENT: &str = concat!("vacancy-scout/", env!("CARGO_PKG_VERSION"));
const SEARCH_PATH: &str = "/api/v1/search_jobs";
const HEALTH_PATH: &str = "/health";
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Request body understood by the scraping service
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    site_name: [&'a str; 1],
    search_term: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country_indeed: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_remote: Option<bool>,
    results_wanted: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hours_old: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    easy_apply: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description_format: Option<&'a str>,
    linkedin_fetch_description: bool,
}

/// Scraper for one site of a JobSpy-compatible service
pub struct JobSpyScraper {
    site: String,
    base_url: String,
    http_client: reqwest::Client,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl JobSpyScraper {
    pub fn new(base_url: impl Into<String>, site: impl Into<String>) -> Result<Self, ScraperError> {
        Self::with_rate(base_url, site, DEFAULT_REQUESTS_PER_MINUTE)
    }

    /// Build with an explicit request budget per minute (0 is treated as 1)
    pub fn with_rate(
        base_url: impl Into<String>,
        site: impl Into<String>,
        requests_per_minute: u32,
    ) -> Result<Self, ScraperError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            // Scrapes with descriptions can take minutes on the service side
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ScraperError::Network(e.to_string()))?;

        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            site: site.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Scraper for JobSpyScraper {
    fn name(&self) -> &str {
        &self.site
    }

    async fn check_availability(&self) -> bool {
        match self.http_client.get(self.url(HEALTH_PATH)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(site = %self.site, error = %e, "Scraping service unreachable");
                false
            }
        }
    }

    async fn scrape(&self, input: &ScraperInput) -> Result<ScrapeOutput, ScraperError> {
        self.rate_limiter.until_ready().await;

        let body = SearchRequest {
            site_name: [self.site.as_str()],
            search_term: &input.search_term,
            location: input.location.as_deref(),
            country_indeed: input.country.as_deref(),
            is_remote: input.is_remote,
            results_wanted: input.results_wanted,
            job_type: input.job_type.as_deref(),
            hours_old: input.hours_old,
            easy_apply: input.easy_apply,
            description_format: input.description_format.as_deref(),
            linkedin_fetch_description: true,
        };

        tracing::debug!(
            site = %self.site,
            search_term = %input.search_term,
            location = ?input.location,
            "Querying scraping service"
        );

        let response = self
            .http_client
            .post(self.url(SEARCH_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|e| ScraperError::Network(e.to_string()))?;

        let status = response.status();

        if status == 429 {
            return Err(ScraperError::RateLimited);
        }

        if status == 503 {
            return Err(ScraperError::Unavailable(self.site.clone()));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScraperError::Api(status.as_u16(), error_text));
        }

        response
            .json::<ScrapeOutput>()
            .await
            .map_err(|e| ScraperError::Parse(e.to_string()))
    }
}

/// Build one scraper per configured site
pub fn build_scrapers(
    base_url: &str,
    sites: &[String],
) -> Result<Vec<Arc<dyn Scraper>>, ScraperError> {
    sites
        .iter()
        .map(|site| {
            JobSpyScraper::new(base_url, site.clone()).map(|s| Arc::new(s) as Arc<dyn Scraper>)
        })
        .collect()
}
