//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::AnalysisConfig;
use crate::services::session_tracker::SessionTracker;
use crate::source::EventSource;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Defaults for anything a request leaves out
    pub config: Arc<AnalysisConfig>,
    /// Where sessions fetch their records from
    pub source: Arc<dyn EventSource>,
    pub sessions: SessionTracker,
}

impl AppState {
    pub fn new(config: AnalysisConfig, source: Arc<dyn EventSource>) -> Self {
        Self {
            config: Arc::new(config),
            source,
            sessions: SessionTracker::new(),
        }
    }
}
