//! Shared application state: the session registry and the per-session rooms.

/// Runtime session, participant, and round types.
pub mod session;
mod sse;
/// Session lifecycle state machine.
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    config::AppConfig,
    dao::{fs_sink::FileSummarySink, sink::SummarySink},
    generator::{context::ContextCache, providers::CooldownTable},
    state::session::Session,
};

pub use self::sse::SseHub;

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Broadcast channel capacity per session room.
const ROOM_CHANNEL_CAPACITY: usize = 64;

/// One live session: the match state behind its single-writer mutex plus the
/// broadcast hub its viewers subscribe to.
pub struct SessionRoom {
    session: Mutex<Session>,
    hub: SseHub,
}

impl SessionRoom {
    /// Wrap a freshly created session.
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            hub: SseHub::new(ROOM_CHANNEL_CAPACITY),
        }
    }

    /// The session mutex. Every mutation happens under this lock.
    pub fn session(&self) -> &Mutex<Session> {
        &self.session
    }

    /// The room's broadcast hub.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }
}

/// Central application state shared by every handler and background task.
pub struct AppState {
    config: AppConfig,
    sessions: DashMap<String, Arc<SessionRoom>>,
    cooldowns: CooldownTable,
    context_cache: ContextCache,
    image_cache: DashMap<String, String>,
    exports_in_flight: DashMap<String, ()>,
    http: reqwest::Client,
    sink: Arc<dyn SummarySink>,
}

impl AppState {
    /// Construct the shared state wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        let sink = Arc::new(FileSummarySink::new(config.export_dir.clone()));
        Self::with_sink(config, sink)
    }

    /// Construct the shared state with an explicit summary sink.
    pub fn with_sink(config: AppConfig, sink: Arc<dyn SummarySink>) -> SharedState {
        Arc::new(Self {
            config,
            sessions: DashMap::new(),
            cooldowns: CooldownTable::new(),
            context_cache: ContextCache::new(),
            image_cache: DashMap::new(),
            exports_in_flight: DashMap::new(),
            http: reqwest::Client::new(),
            sink,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The session registry keyed by join code.
    pub fn sessions(&self) -> &DashMap<String, Arc<SessionRoom>> {
        &self.sessions
    }

    /// Look up a session room by join code.
    pub fn room(&self, code: &str) -> Option<Arc<SessionRoom>> {
        self.sessions.get(code).map(|entry| entry.clone())
    }

    /// Insert a new room, failing when the code is already taken.
    pub fn insert_room(&self, code: String, room: Arc<SessionRoom>) -> bool {
        match self.sessions.entry(code) {
            dashmap::Entry::Occupied(_) => false,
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(room);
                true
            }
        }
    }

    /// Remove a room from the registry, returning it when present.
    pub fn remove_room(&self, code: &str) -> Option<Arc<SessionRoom>> {
        self.sessions.remove(code).map(|(_, room)| room)
    }

    /// Shared backend cooldown table.
    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }

    /// Shared fact-context cache.
    pub fn context_cache(&self) -> &ContextCache {
        &self.context_cache
    }

    /// Shared query-to-URL image cache.
    pub fn image_cache(&self) -> &DashMap<String, String> {
        &self.image_cache
    }

    /// Per-session export dedup markers.
    pub fn exports_in_flight(&self) -> &DashMap<String, ()> {
        &self.exports_in_flight
    }

    /// Shared HTTP client for all outbound calls.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Summary sink used when a match finishes.
    pub fn sink(&self) -> &Arc<dyn SummarySink> {
        &self.sink
    }
}
