//! Shared test doubles for scout-search integration tests
//!
//! Mock scrapers and LLM clients implement the production traits; sessions
//! run against a [`MemorySnapshotStore`] with zero retry and courtesy delays.

#![allow(dead_code)]

use async_trait::async_trait;
use scout_common::events::EventBus;
use scout_search::models::{MultiStageProgress, SearchSettings, SessionStatus};
use scout_search::services::enrichment::{
    CompletionRequest, CompletionResponse, LlmClient, LlmClientFactory, LlmError, TokenUsage,
};
use scout_search::services::{
    CollectionConfig, MemorySnapshotStore, OrchestratorConfig, ScrapeOutput, Scraper,
    ScraperError, ScraperInput, SearchOrchestrator, SharedScraper,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scraped job as the scraping service returns it
pub fn job(title: &str, company: &str, url: &str) -> Value {
    json!({
        "title": title,
        "company": company,
        "job_url": url,
        "description": format!("{} at {}", title, company),
        "location": {"city": "Remote", "country": "Germany"},
    })
}

/// Counts scrape calls in flight and remembers the highest count seen
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Scripted scraper: jobs per search term, optional failure and latency
pub struct MockScraper {
    name: String,
    jobs: HashMap<String, Vec<Value>>,
    available: bool,
    always_fail: bool,
    failing_position: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: InFlight,
    gauge: Option<Arc<InFlight>>,
}

impl MockScraper {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            jobs: HashMap::new(),
            available: true,
            always_fail: false,
            failing_position: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: InFlight::default(),
            gauge: None,
        }
    }

    /// `count` distinct jobs for `position`
    pub fn with_jobs(mut self, position: &str, count: usize) -> Self {
        let jobs = (0..count)
            .map(|i| {
                job(
                    &format!("{} #{}", position, i),
                    &format!("{} Company {}", self.name, i),
                    &format!("https://{}.example/{}/{}", self.name, position.replace(' ', "-"), i),
                )
            })
            .collect();
        self.jobs.insert(position.to_string(), jobs);
        self
    }

    pub fn with_raw_jobs(mut self, position: &str, jobs: Vec<Value>) -> Self {
        self.jobs.insert(position.to_string(), jobs);
        self
    }

    pub fn failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Every scrape of `position` fails; other positions succeed
    pub fn failing_on(mut self, position: &str) -> Self {
        self.failing_position = Some(position.to_string());
        self
    }

    /// Also count this scraper's in-flight calls on a gauge shared with others
    pub fn with_gauge(mut self, gauge: Arc<InFlight>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most scrape calls of this scraper that were in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Scraper for MockScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn scrape(&self, input: &ScraperInput) -> Result<ScrapeOutput, ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.enter();
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.exit();
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }

        if self.always_fail || self.failing_position.as_deref() == Some(input.search_term.as_str()) {
            return Err(ScraperError::Network("connection reset".to_string()));
        }
        Ok(ScrapeOutput {
            jobs: self.jobs.get(&input.search_term).cloned().unwrap_or_default(),
        })
    }
}

/// LLM client answering every vacancy with the same enrichment
pub struct MockLlm {
    fail_with_auth: bool,
    requests: AtomicUsize,
}

impl MockLlm {
    pub fn answering() -> Arc<Self> {
        Arc::new(Self {
            fail_with_auth: false,
            requests: AtomicUsize::new(0),
        })
    }

    pub fn rejecting_key() -> Arc<Self> {
        Arc::new(Self {
            fail_with_auth: true,
            requests: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_with_auth {
            return Err(LlmError::Authentication("invalid api key".to_string()));
        }
        Ok(CompletionResponse {
            content: json!({
                "summary": "Platform team building internal tooling.",
                "seniority": "senior",
                "remote_policy": "remote",
                "salary_range": null,
                "tech_stack": ["rust", "kubernetes"],
                "relevance_score": 0.8,
                "match_reasons": ["rust"],
            })
            .to_string(),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
            },
        })
    }
}

/// Hands out one shared client and remembers the keys it was asked for
pub struct MockLlmFactory {
    client: Arc<MockLlm>,
    keys: std::sync::Mutex<Vec<String>>,
}

impl MockLlmFactory {
    pub fn new(client: Arc<MockLlm>) -> Arc<Self> {
        Arc::new(Self {
            client,
            keys: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

impl LlmClientFactory for MockLlmFactory {
    fn create(&self, api_key: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
        self.keys.lock().unwrap().push(api_key.to_string());
        Ok(self.client.clone())
    }
}

/// Scheduler tunables with no waiting and a single retry
pub fn fast_collection() -> CollectionConfig {
    CollectionConfig {
        max_concurrent_sources: 2,
        max_concurrent_positions: 1,
        max_retries: 1,
        base_retry_delay_ms: 0,
        inter_request_delay_ms: 0,
    }
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        collection: fast_collection(),
        tick_interval: Duration::from_millis(10),
        filter_chunk_size: 2,
        ..OrchestratorConfig::default()
    }
}

/// Settings enabling exactly the given sources
pub fn settings(positions: &[&str], sources: &[&str]) -> SearchSettings {
    SearchSettings {
        positions: positions.iter().map(|p| p.to_string()).collect(),
        sources: sources
            .iter()
            .map(|s| (s.to_string(), true))
            .collect::<BTreeMap<_, _>>(),
        ..SearchSettings::default()
    }
}

pub struct Harness {
    pub orchestrator: SearchOrchestrator,
    pub store: Arc<MemorySnapshotStore>,
    pub llm: Arc<MockLlm>,
    pub factory: Arc<MockLlmFactory>,
    pub event_bus: EventBus,
}

pub fn harness(scrapers: Vec<SharedScraper>, llm: Arc<MockLlm>) -> Harness {
    harness_with(scrapers, llm, Arc::new(MemorySnapshotStore::new()), fast_config())
}

pub fn harness_with(
    scrapers: Vec<SharedScraper>,
    llm: Arc<MockLlm>,
    store: Arc<MemorySnapshotStore>,
    config: OrchestratorConfig,
) -> Harness {
    let factory = MockLlmFactory::new(llm.clone());
    let event_bus = EventBus::new(1024);
    let orchestrator = SearchOrchestrator::new(
        scrapers,
        store.clone(),
        factory.clone(),
        event_bus.clone(),
        config,
    );
    Harness {
        orchestrator,
        store,
        llm,
        factory,
        event_bus,
    }
}

/// Poll progress until `status` is reached or five seconds pass
pub async fn wait_for_status(
    orchestrator: &SearchOrchestrator,
    session_id: &str,
    status: SessionStatus,
) -> MultiStageProgress {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(progress) = orchestrator.get_progress(session_id).await {
            if progress.status == status {
                return progress;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "session {} did not reach {:?}: {:?}",
                session_id,
                status,
                orchestrator.get_progress(session_id).await.map(|p| p.status)
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the session's pipeline task has exited
pub async fn wait_for_idle(orchestrator: &SearchOrchestrator, session_id: &str) {
    let Some(handle) = orchestrator.registry().get(session_id).await else {
        return;
    };
    let task = handle.control.lock().await.task.take();
    if let Some(task) = task {
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }
}
