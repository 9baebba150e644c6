pub mod ai;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod error;
pub mod gamification;
pub mod leaderboard;
pub mod planner;
pub mod rest;
pub mod storage;

use std::sync::Arc;

use ai::AiClient;
use calendar::CalendarClient;
use config::AppConfig;
use storage::Storage;

/// Shared application state passed to every REST handler.
///
/// All collaborators are explicitly constructed at startup and injected
/// through axum `State` — no module-level singletons.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<Storage>,
    /// External language-model client (study coach, task breakdown, planner text).
    pub ai: Arc<AiClient>,
    pub calendar: Arc<CalendarClient>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(config: Arc<AppConfig>, storage: Arc<Storage>) -> Self {
        let ai = Arc::new(AiClient::new(&config));
        let calendar = Arc::new(CalendarClient::new(config.calendar.clone()));
        Self {
            config,
            storage,
            ai,
            calendar,
            started_at: std::time::Instant::now(),
        }
    }
}
