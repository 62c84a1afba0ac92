//! Job envelope handling at the queue boundary.
//!
//! The queue runtime delivers `{"id": ..., "input": {...}}` and expects
//! either the handler's output object or `{"error": ...}` back. In local
//! mode the envelope comes from a file (`test_input.json` by default) or
//! stdin, and the outcome is printed to stdout.

use std::path::{Path, PathBuf};

use i2v_core::job::JobOutput;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::Instrument;

use crate::config::{WorkerConfig, DEFAULT_TEST_INPUT_FILE};
use crate::error::RunnerError;
use crate::handler::Orchestrator;

/// A job as delivered by the queue runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    /// Job fields; a missing `input` fails validation like an empty one.
    #[serde(default)]
    pub input: Value,
}

/// What the runtime gets back for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The handler returned normally (video or not-found).
    Completed(JobOutput),
    /// The handler raised; the message is reported as the job error.
    Failed(String),
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }

    /// Wire representation returned to the runtime.
    pub fn to_json(&self) -> Value {
        match self {
            JobOutcome::Completed(JobOutput::Video { video_base64 }) => {
                serde_json::json!({ "video_base64": video_base64 })
            }
            JobOutcome::Completed(JobOutput::NotFound { error }) | JobOutcome::Failed(error) => {
                serde_json::json!({ "error": error })
            }
        }
    }
}

/// Run one job and convert its result into a [`JobOutcome`].
pub async fn run_job(orchestrator: &Orchestrator, job: &JobEnvelope) -> JobOutcome {
    let job_id = job.id.as_deref().unwrap_or("local");
    let span = tracing::info_span!("job", job_id);

    async {
        let input = if job.input.is_null() {
            Value::Object(Default::default())
        } else {
            job.input.clone()
        };

        match orchestrator.handle(&input).await {
            Ok(output) => {
                tracing::info!(video = matches!(output, JobOutput::Video { .. }), "Job finished");
                JobOutcome::Completed(output)
            }
            Err(e) => {
                tracing::error!(error = %e, "Job failed");
                JobOutcome::Failed(e.to_string())
            }
        }
    }
    .instrument(span)
    .await
}

/// Where the runner reads its job envelope from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    File(PathBuf),
    Stdin,
}

impl JobSource {
    /// `JOB_INPUT_PATH` if set, else `test_input.json` in the working
    /// directory if it exists, else stdin.
    pub fn from_config(config: &WorkerConfig) -> Self {
        match &config.job_input_path {
            Some(path) => JobSource::File(path.clone()),
            None if Path::new(DEFAULT_TEST_INPUT_FILE).is_file() => {
                JobSource::File(PathBuf::from(DEFAULT_TEST_INPUT_FILE))
            }
            None => JobSource::Stdin,
        }
    }

    fn origin(&self) -> String {
        match self {
            JobSource::File(path) => path.display().to_string(),
            JobSource::Stdin => "stdin".to_string(),
        }
    }
}

/// Read and parse the job envelope.
pub async fn read_envelope(source: &JobSource) -> Result<JobEnvelope, RunnerError> {
    let text = match source {
        JobSource::File(path) => tokio::fs::read_to_string(path).await,
        JobSource::Stdin => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await.map(|_| buf)
        }
    }
    .map_err(|source_err| RunnerError::Read {
        origin: source.origin(),
        source: source_err,
    })?;

    parse_envelope(&text).map_err(|e| RunnerError::Parse {
        origin: source.origin(),
        source: e,
    })
}

pub fn parse_envelope(text: &str) -> Result<JobEnvelope, serde_json::Error> {
    serde_json::from_str(text)
}
