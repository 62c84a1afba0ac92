//! Generation orchestrator: one job in, one video (or a not-found result) out.
//!
//! Per job the sequence is strictly linear:
//!
//! 1. validate the request (no network before this passes),
//! 2. materialize the input image into a fresh `task_<uuid>` workspace,
//! 3. load the workflow template and inject the job parameters,
//! 4. open the WebSocket, submit the graph, wait for its completion signal,
//! 5. fetch the history and return the first video as base64.
//!
//! The WebSocket is closed on every path once opened, and the workspace is
//! removed when the job ends.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use i2v_comfyui::api::ComfyUIApi;
use i2v_comfyui::client::{ComfyUIClient, ComfyUIConnection};
use i2v_comfyui::history::{find_entry, VideoArtifact};
use i2v_core::input::{InputMaterializer, JobWorkspace};
use i2v_core::job::{JobOutput, JobRequest};
use i2v_core::workflow::Workflow;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::JobError;

/// Runs jobs against one ComfyUI server.
///
/// Created once per process. The ComfyUI client id is generated here and
/// reused for every job; completion messages are matched on prompt id, so
/// sharing it across sequential jobs is safe.
pub struct Orchestrator {
    config: WorkerConfig,
    client: ComfyUIClient,
    api: ComfyUIApi,
    materializer: InputMaterializer,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// * `shutdown` - cancelled when the process is asked to stop; aborts
    ///   an in-progress wait and keeps new jobs from being submitted.
    pub fn new(config: WorkerConfig, shutdown: CancellationToken) -> Self {
        let client = ComfyUIClient::new(config.ws_url());
        let api = ComfyUIApi::new(config.api_url());
        let materializer = InputMaterializer::new(config.download_program.clone());

        tracing::info!(
            client_id = %client.client_id(),
            api_url = %api.api_url(),
            "Orchestrator ready",
        );

        Self {
            config,
            client,
            api,
            materializer,
            shutdown,
        }
    }

    /// Replace the input materializer (custom download command).
    pub fn with_materializer(mut self, materializer: InputMaterializer) -> Self {
        self.materializer = materializer;
        self
    }

    /// Process-lifetime id tagging every WebSocket this worker opens.
    pub fn client_id(&self) -> &str {
        self.client.client_id()
    }

    /// Execute one job end-to-end.
    ///
    /// Returns `Ok(JobOutput::NotFound)` when the backend finished without
    /// producing a video; every other problem is an `Err`.
    pub async fn handle(&self, input: &Value) -> Result<JobOutput, JobError> {
        let request = JobRequest::from_input(input)?;
        tracing::info!(
            source = request.image.kind().as_str(),
            width = request.params.width,
            height = request.params.height,
            length = request.params.length,
            seed = request.params.seed,
            "Processing job input",
        );

        let workspace = JobWorkspace::new(&self.config.temp_root);
        let result = self.run(&request, &workspace).await;

        if let Err(e) = workspace.remove().await {
            tracing::warn!(
                dir = %workspace.dir().display(),
                error = %e,
                "Failed to remove job workspace",
            );
        }
        result
    }

    async fn run(&self, request: &JobRequest, workspace: &JobWorkspace) -> Result<JobOutput, JobError> {
        self.ensure_running()?;
        let image_path = self.materializer.materialize(&request.image, workspace).await?;
        tracing::debug!(image = %image_path.display(), "Input image ready");

        let mut workflow = Workflow::load(&self.config.workflow_path).await?;
        workflow.apply(&image_path, &request.params)?;
        let graph = workflow.into_value();

        self.ensure_running()?;
        let mut conn = self.client.connect().await?;
        tracing::debug!(client_id = %conn.client_id(), "Event socket open");
        let outcome = self.execute(&mut conn, &graph).await;
        conn.close().await;
        outcome
    }

    /// Nothing is submitted once shutdown has been requested.
    fn ensure_running(&self) -> Result<(), JobError> {
        if self.shutdown.is_cancelled() {
            tracing::info!("Shutdown requested, not starting job");
            return Err(JobError::ShuttingDown);
        }
        Ok(())
    }

    /// Submit, wait, fetch. The caller owns (and closes) the connection.
    async fn execute(&self, conn: &mut ComfyUIConnection, graph: &Value) -> Result<JobOutput, JobError> {
        let submitted = self.api.submit_workflow(graph, self.client.client_id()).await?;
        tracing::info!(
            prompt_id = %submitted.prompt_id,
            queue_position = submitted.number,
            "Workflow submitted to ComfyUI",
        );
        if submitted.has_node_errors() {
            tracing::warn!(
                prompt_id = %submitted.prompt_id,
                node_errors = %submitted.node_errors,
                "ComfyUI reported node errors",
            );
        }
        let prompt_id = submitted.prompt_id;

        self.await_completion(conn, &prompt_id).await?;

        let history = self.api.get_history(&prompt_id).await?;
        let entry = find_entry(&history, &prompt_id)?;

        match entry.first_video(&prompt_id)? {
            Some(video) => {
                let bytes = self.load_artifact(&video.node_id, &video.artifact).await?;
                tracing::info!(
                    prompt_id = %prompt_id,
                    node_id = %video.node_id,
                    bytes = bytes.len(),
                    "Video extracted",
                );
                Ok(JobOutput::Video {
                    video_base64: STANDARD.encode(bytes),
                })
            }
            None => {
                let status = entry
                    .status
                    .as_ref()
                    .and_then(|s| s.status_str.as_deref())
                    .unwrap_or("unknown");
                if status == "error" {
                    tracing::error!(prompt_id = %prompt_id, status, "ComfyUI execution failed, no video produced");
                } else {
                    tracing::warn!(prompt_id = %prompt_id, status, "No video found in ComfyUI history");
                }
                Ok(JobOutput::not_found())
            }
        }
    }

    /// Wait for the completion signal, bounded by the configured timeout and
    /// by process shutdown. On either, the prompt is abandoned.
    async fn await_completion(&self, conn: &mut ComfyUIConnection, prompt_id: &str) -> Result<(), JobError> {
        let timeout = self.config.wait_timeout;

        tokio::select! {
            result = tokio::time::timeout(timeout, conn.wait_for_completion(prompt_id)) => {
                match result {
                    Ok(done) => Ok(done?),
                    Err(_elapsed) => {
                        tracing::error!(prompt_id, timeout_secs = timeout.as_secs(), "Timed out waiting for ComfyUI");
                        self.abandon(prompt_id).await;
                        Err(JobError::Timeout {
                            prompt_id: prompt_id.to_string(),
                            timeout_secs: timeout.as_secs(),
                        })
                    }
                }
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!(prompt_id, "Shutdown requested, abandoning prompt");
                self.abandon(prompt_id).await;
                Err(JobError::Cancelled {
                    prompt_id: prompt_id.to_string(),
                })
            }
        }
    }

    /// Drop the prompt if still queued and stop it if already running.
    /// Both calls are best effort.
    async fn abandon(&self, prompt_id: &str) {
        if let Err(e) = self.api.cancel_execution(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Failed to remove prompt from ComfyUI queue");
        }
        if let Err(e) = self.api.interrupt(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Failed to interrupt ComfyUI execution");
        }
    }

    /// Read the artifact bytes, from disk when ComfyUI reports a local path,
    /// otherwise through `/view`.
    async fn load_artifact(&self, node_id: &str, artifact: &VideoArtifact) -> Result<Vec<u8>, JobError> {
        if let Some(path) = &artifact.fullpath {
            return tokio::fs::read(Path::new(path))
                .await
                .map_err(|source| JobError::ArtifactRead {
                    path: path.clone(),
                    source,
                });
        }

        match &artifact.filename {
            Some(filename) => Ok(self
                .api
                .view(filename, &artifact.subfolder, &artifact.folder_type)
                .await?),
            None => Err(JobError::ArtifactUnresolvable(node_id.to_string())),
        }
    }
}
