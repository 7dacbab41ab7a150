//! In-memory registry of search sessions
//!
//! Maps session id → [`SessionHandle`]. Every handle owns the canonical state
//! of one session behind its own lock; the registry lock is only held for
//! lookups, inserts and removals.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::eta::{EtaConfig, EtaEngine};
use crate::models::{CollectionCheckpoint, MultiStageProgress, SearchSettings, Vacancy};

/// Active time spent in the current stage, excluding pauses
#[derive(Debug, Clone, Default)]
pub struct StageClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl StageClock {
    /// Restart from zero and run
    pub fn restart(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(Instant::now());
    }

    /// Continue counting without losing accumulated time
    pub fn run(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let running = self.running_since.map(|s| s.elapsed()).unwrap_or_default();
        (self.accumulated + running).as_secs_f64()
    }
}

/// Canonical state of one session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub progress: MultiStageProgress,
    /// Settings as supplied, API key included (never persisted)
    pub settings: SearchSettings,
    pub vacancies: Vec<Vacancy>,
    pub checkpoint: CollectionCheckpoint,
    pub clock: StageClock,
}

impl SessionState {
    pub fn new(progress: MultiStageProgress, settings: SearchSettings) -> Self {
        Self {
            progress,
            settings,
            vacancies: Vec::new(),
            checkpoint: CollectionCheckpoint::default(),
            clock: StageClock::default(),
        }
    }
}

/// Run control of a session's pipeline task
///
/// Its lock also serializes snapshot saves of the session.
#[derive(Debug, Default)]
pub struct RunControl {
    pub cancel: CancellationToken,
    pub task: Option<JoinHandle<()>>,
    /// Set once the session is deleted; no snapshot is written afterwards
    pub deleted: bool,
}

/// Shared handle to one session
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub state: Arc<RwLock<SessionState>>,
    pub eta: Arc<Mutex<EtaEngine>>,
    pub control: Arc<Mutex<RunControl>>,
}

impl SessionHandle {
    pub fn new(state: SessionState, eta_config: EtaConfig) -> Self {
        Self {
            session_id: state.progress.session_id.clone(),
            state: Arc::new(RwLock::new(state)),
            eta: Arc::new(Mutex::new(EtaEngine::new(eta_config))),
            control: Arc::new(Mutex::new(RunControl::default())),
        }
    }

    /// Defensive copy of the session progress
    pub async fn progress(&self) -> MultiStageProgress {
        self.state.read().await.progress.clone()
    }
}

/// Why an insert was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionActive(pub String);

/// Concurrency-safe session map
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Insert a session, replacing a terminal one with the same id
    ///
    /// Refused while a non-terminal session with that id is registered.
    pub async fn insert(&self, handle: SessionHandle) -> Result<(), SessionActive> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&handle.session_id) {
            if !existing.state.read().await.progress.is_terminal() {
                return Err(SessionActive(handle.session_id.clone()));
            }
        }
        sessions.insert(handle.session_id.clone(), handle);
        Ok(())
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop terminal sessions that ended before `cutoff`; returns their ids
    pub async fn evict_finished(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, handle) in sessions.iter() {
            let state = handle.state.read().await;
            let ended = state.progress.end_time.map(|end| end < cutoff).unwrap_or(false);
            if state.progress.is_terminal() && ended {
                expired.push(id.clone());
            }
        }
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}
