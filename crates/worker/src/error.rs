//! Job-level and runner-level error types.

use i2v_comfyui::api::ComfyUIApiError;
use i2v_comfyui::client::ComfyUIClientError;
use i2v_comfyui::history::HistoryError;
use i2v_core::error::CoreError;

/// Everything that can fail a job.
///
/// The runner reports the `Display` text of this error back to the queue.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Validation, input materialization, or workflow template errors.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    ComfyUIApi(#[from] ComfyUIApiError),

    #[error(transparent)]
    ComfyUIClient(#[from] ComfyUIClientError),

    #[error(transparent)]
    History(#[from] HistoryError),

    /// No completion signal within the configured wait.
    #[error("Timed out after {timeout_secs}s waiting for prompt {prompt_id}")]
    Timeout { prompt_id: String, timeout_secs: u64 },

    /// The worker is shutting down.
    #[error("Shutdown requested while waiting for prompt {prompt_id}")]
    Cancelled { prompt_id: String },

    /// Shutdown was requested before anything was submitted.
    #[error("Shutdown requested, job not started")]
    ShuttingDown,

    #[error("Failed to read video artifact {path}: {source}")]
    ArtifactRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Video artifact from node {0} has neither fullpath nor filename")]
    ArtifactUnresolvable(String),
}

/// Errors reading the job envelope before any job runs.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to read job input from {origin}: {source}")]
    Read {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Job input from {origin} is not valid JSON: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}
