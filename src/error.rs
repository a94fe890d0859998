//! Error kinds raised while advancing items through the acquisition pipeline.

use std::time::Duration;

use thiserror::Error;

/// Failure raised by a pipeline step or one of its collaborators.
///
/// Every variant knows whether it should be absorbed (the entity stays in
/// its current state for the next pass) or should terminate the attempt.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No metadata match for '{0}'")]
    MetadataNotFound(String),

    #[error("No candidates found for '{0}'")]
    NoCandidatesFound(String),

    #[error("Provider rejected {0}")]
    ProviderRejected(String),

    #[error("Remote download failed: {0}")]
    DownloadFailed(String),

    #[error("Already tracked as item {0}")]
    AlreadyTracked(i32),

    #[error("File not yet available: {0}")]
    FileNotYetAvailable(String),

    #[error("File not found after {attempts} attempts: {target}")]
    FileNotFound { target: String, attempts: i32 },

    #[error("Failed to create symlink at {path}: {reason}")]
    SymlinkCreationFailed { path: String, reason: String },

    #[error("{service} unavailable: {message}")]
    TransientProviderError {
        service: String,
        message: String,
        /// Cool-down the provider asked for, when it said so.
        retry_after: Option<Duration>,
    },

    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),
}

impl PipelineError {
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientProviderError {
            service: service.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// A transient failure that names how long the caller should hold off.
    pub fn rate_limited(
        service: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::TransientProviderError {
            service: service.into(),
            message: message.into(),
            retry_after,
        }
    }

    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TransientProviderError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the condition should leave the entity where it is instead of failing it.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FileNotYetAvailable(_) | Self::TransientProviderError { .. }
        )
    }
}

impl From<sea_orm::DbErr> for PipelineError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}
