//! Application state shared across handlers.

use std::sync::Arc;

use cardsmith_domain::GenerationService;
use cardsmith_session::SessionStore;

use crate::config::ServerConfig;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Flashcard generation service; owns the session store.
    pub generation: Arc<GenerationService>,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(generation: GenerationService, config: ServerConfig) -> Self {
        Self {
            generation: Arc::new(generation),
            config: Arc::new(config),
        }
    }

    /// The upload session store.
    pub fn sessions(&self) -> &SessionStore {
        self.generation.sessions()
    }
}
