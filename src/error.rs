use thiserror::Error;

use crate::ai::AiError;

/// Typed error hierarchy for the media pipeline.
///
/// The worker loop records `to_string()` of these on failed jobs, so every
/// variant carries enough context (stage, entity, exit status) to make the
/// stored `error` column useful on its own.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A prerequisite asset is missing — e.g. transcoding a lecture whose
    /// raw video was never uploaded or no longer exists in storage.
    #[error("missing asset: {0}")]
    MissingAsset(String),

    /// An external tool exited non-zero. Carries the stage name and a
    /// stderr excerpt rather than the tool's full output.
    #[error("{stage} failed ({status}): {stderr}")]
    Subprocess {
        stage: String,
        status: String,
        stderr: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Api(#[from] AiError),

    /// Data that would corrupt derived state if persisted — embedding count
    /// mismatches, empty vectors. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(String),
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        PipelineError::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Database(e.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Validation(e.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        PipelineError::Io(e.to_string())
    }
}
