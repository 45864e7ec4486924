//! Error types for CLI operations.

use std::path::Path;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Race could not be built or run
    #[error("Race failed: {message}")]
    Race { message: String },

    /// Console input closed while a prompt was waiting
    #[error("Console input closed (use --yes for unattended runs)")]
    InputClosed,
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn race(message: impl Into<String>) -> Self {
        Self::Race {
            message: message.into(),
        }
    }
}
