//! Shared application state.

use crate::config::Config;
use calm_core::SessionController;

/// Shared application state.
pub struct AppState {
    pub controller: SessionController,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let controller = SessionController::new(config.session());
        Self { controller, config }
    }
}
