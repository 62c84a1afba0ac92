//! Errors raised while turning a job input into a submittable graph.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The job input or the workflow template has the wrong shape.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The download program could not be started or exited non-zero.
    #[error("Download failed: {0}")]
    Download(String),

    /// `image_base64` is empty or not valid base64.
    #[error("Invalid base64 payload: {0}")]
    Decode(String),

    /// An `image_<kind>` field whose kind is not path, url or base64.
    #[error("Unsupported input type: {0}")]
    UnsupportedInput(String),

    /// The workflow template lacks one or more nodes/inputs that the
    /// parameter table writes to. Every missing slot is listed.
    #[error("Workflow template does not match parameter table, missing: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
