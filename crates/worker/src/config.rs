//! Worker settings read from the environment (after `.env`, if present).

use std::path::PathBuf;
use std::time::Duration;

use i2v_core::input::DEFAULT_DOWNLOAD_PROGRAM;
use i2v_core::workflow::DEFAULT_WORKFLOW_PATH;

/// Port ComfyUI listens on inside the worker image.
pub const COMFYUI_PORT: u16 = 8188;

/// Default upper bound on waiting for a single prompt to finish.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 3600;

/// File the runner picks up when no explicit job input is configured.
pub const DEFAULT_TEST_INPUT_FILE: &str = "test_input.json";

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// ComfyUI host (default: `127.0.0.1`).
    pub server_address: String,
    /// ComfyUI port. Always [`COMFYUI_PORT`] outside of tests.
    pub comfyui_port: u16,
    /// Workflow template read for every job.
    pub workflow_path: PathBuf,
    /// Directory under which per-job `task_<uuid>` workspaces are created.
    pub temp_root: PathBuf,
    /// Maximum time to wait for the completion signal.
    pub wait_timeout: Duration,
    /// wget-compatible program used for `image_url` inputs.
    pub download_program: String,
    /// Explicit job envelope file; `None` means `test_input.json` if it
    /// exists, else stdin.
    pub job_input_path: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default               |
    /// |---------------------|-----------------------|
    /// | `SERVER_ADDRESS`    | `127.0.0.1`           |
    /// | `WORKFLOW_PATH`     | `/new_Wan22_api.json` |
    /// | `TEMP_ROOT`         | `.`                   |
    /// | `WAIT_TIMEOUT_SECS` | `3600`                |
    /// | `DOWNLOAD_PROGRAM`  | `wget`                |
    /// | `JOB_INPUT_PATH`    | unset                 |
    pub fn from_env() -> Self {
        let server_address =
            std::env::var("SERVER_ADDRESS").unwrap_or_else(|_| "127.0.0.1".into());

        let workflow_path = std::env::var("WORKFLOW_PATH")
            .unwrap_or_else(|_| DEFAULT_WORKFLOW_PATH.into())
            .into();

        let temp_root = std::env::var("TEMP_ROOT").unwrap_or_else(|_| ".".into()).into();

        let wait_timeout_secs: u64 = match std::env::var("WAIT_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %raw,
                    "WAIT_TIMEOUT_SECS is not a valid integer, using {DEFAULT_WAIT_TIMEOUT_SECS}",
                );
                DEFAULT_WAIT_TIMEOUT_SECS
            }),
            Err(_) => DEFAULT_WAIT_TIMEOUT_SECS,
        };

        let download_program =
            std::env::var("DOWNLOAD_PROGRAM").unwrap_or_else(|_| DEFAULT_DOWNLOAD_PROGRAM.into());

        let job_input_path = std::env::var("JOB_INPUT_PATH").ok().map(PathBuf::from);

        Self {
            server_address,
            comfyui_port: COMFYUI_PORT,
            workflow_path,
            temp_root,
            wait_timeout: Duration::from_secs(wait_timeout_secs),
            download_program,
            job_input_path,
        }
    }

    /// HTTP base URL of the ComfyUI server.
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.server_address, self.comfyui_port)
    }

    /// WebSocket base URL of the ComfyUI server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.server_address, self.comfyui_port)
    }
}
