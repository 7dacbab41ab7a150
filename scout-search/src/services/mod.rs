//! Service modules for the multi-stage vacancy search
//!
//! Leaf-first: ETA engine, scrapers, collection scheduler, filtering,
//! enrichment, snapshot store and export, then the orchestrator tying them
//! together.

pub mod collection;
pub mod enrichment;
pub mod eta;
pub mod filtering;
pub mod jobspy_scraper;
pub mod markdown_export;
pub mod scraper;
pub mod search_orchestrator;
pub mod session_registry;
pub mod snapshot_store;

pub use collection::{
    CollectionConfig, CollectionHooks, CollectionRequest, CollectionScheduler,
    SharedCollectionProgress,
};
pub use enrichment::{
    Enricher, LlmClient, LlmClientFactory, LlmError, OpenAiClient, OpenAiClientFactory,
};
pub use eta::{format_eta, EtaConfig, EtaEngine, EtaError, OverallEtaCalculation, StageEtaCalculation};
pub use filtering::{FilterDecision, FilterEngine};
pub use jobspy_scraper::{build_scrapers, JobSpyScraper};
pub use markdown_export::{export_vacancies, ExportReport};
pub use scraper::{JobPost, ScrapeOutput, Scraper, ScraperError, ScraperInput, SharedScraper};
pub use search_orchestrator::{
    OrchestratorConfig, ResumeSearchRequest, SearchOrchestrator, SearchResponse,
    StartSearchRequest,
};
pub use session_registry::{SessionHandle, SessionRegistry};
pub use snapshot_store::{MemorySnapshotStore, SaveOutcome, SnapshotError, SnapshotStore};
