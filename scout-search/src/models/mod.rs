//! Data models for scout-search
//!
//! - Multi-stage session state machine and progress
//! - Search settings supplied by callers
//! - Vacancies, collection checkpoints and durable snapshots

pub mod collection;
pub mod search_session;
pub mod settings;
pub mod snapshot;
pub mod vacancy;

pub use collection::{
    CollectionCheckpoint, CollectionProgress, CollectionResult, SourceCheckpoint, SourceError,
    SourceState,
};
pub use search_session::{
    LlmUsage, MultiStageProgress, SearchStage, SessionStatus, StageProgress, StageSet,
    StageStatus,
};
pub use settings::{ExportSettings, FilterSettings, LlmSettings, SearchSettings};
pub use snapshot::{SessionSnapshot, SnapshotSummary};
pub use vacancy::{EnrichmentFields, Vacancy, VacancyStatus};
