//! Error types for the session engine.

use calm_types::ConfigError;
use thiserror::Error;

/// A command the session clock refused. State is unchanged whenever one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalmError {
    #[error("Session already active")]
    AlreadyActive,

    #[error("Configuration is locked while the session is active")]
    SessionActive,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("No tokio runtime available to drive the session clock")]
    NoRuntime,
}

impl CalmError {
    /// Short machine-readable code, used by the bridge's error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            CalmError::AlreadyActive => "already_active",
            CalmError::SessionActive => "session_active",
            CalmError::InvalidConfig(_) => "invalid_config",
            CalmError::NoRuntime => "no_runtime",
        }
    }
}
