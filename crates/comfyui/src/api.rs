//! HTTP side of the ComfyUI protocol.
//!
//! The worker needs five endpoints: `POST /prompt` to queue a graph,
//! `POST /queue` and `POST /interrupt` to abandon it while pending or
//! running, `GET /history/{id}` for the result manifest and `GET /view` to
//! fetch an output file by name.

use i2v_core::types::PromptId;
use serde::Deserialize;
use serde_json::Value;

/// Thin `reqwest` wrapper bound to one ComfyUI base URL.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of a successful `POST /prompt`.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub prompt_id: PromptId,
    /// Queue position at submission time.
    #[serde(default)]
    pub number: i32,
    /// Validation complaints for individual nodes. ComfyUI may still queue
    /// the prompt when this is non-empty.
    #[serde(default)]
    pub node_errors: Value,
}

impl SubmitResponse {
    pub fn has_node_errors(&self) -> bool {
        match &self.node_errors {
            Value::Object(errors) => !errors.is_empty(),
            Value::Null => false,
            _ => true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// Transport failure or an undecodable body.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx answer; `body` is the raw text ComfyUI sent back.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl ComfyUIApi {
    /// * `api_url` - base URL such as `http://127.0.0.1:8188`; a trailing
    ///   slash is ignored.
    pub fn new(api_url: impl Into<String>) -> Self {
        let mut api_url = api_url.into();
        while api_url.ends_with('/') {
            api_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    /// Queue `workflow` under `client_id`, so that its execution events
    /// are pushed to the WebSocket opened with the same id.
    pub async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let response = self
            .client
            .post(self.endpoint("/prompt"))
            .json(&serde_json::json!({ "prompt": workflow, "client_id": client_id }))
            .send()
            .await?;

        Ok(error_for_status(response).await?.json().await?)
    }

    /// Drop `prompt_id` from the pending queue. Has no effect on a prompt
    /// that is already running.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(self.endpoint("/queue"))
            .json(&serde_json::json!({ "delete": [prompt_id] }))
            .send()
            .await?;

        error_for_status(response).await?;
        Ok(())
    }

    /// Stop `prompt_id` if it is the one executing right now.
    ///
    /// Servers that predate targeted interrupts ignore the body and stop
    /// whatever is running.
    pub async fn interrupt(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(self.endpoint("/interrupt"))
            .json(&serde_json::json!({ "prompt_id": prompt_id }))
            .send()
            .await?;

        error_for_status(response).await?;
        Ok(())
    }

    /// Raw history for one prompt: `{"<prompt_id>": {"outputs": ..., "status": ...}}`.
    /// The object is empty while the prompt is still queued or running.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/history/{prompt_id}")))
            .send()
            .await?;

        Ok(error_for_status(response).await?.json().await?)
    }

    /// Bytes of an output file addressed the way history entries name it.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(self.endpoint("/view"))
            .query(&[
                ("filename", filename),
                ("subfolder", subfolder),
                ("type", folder_type),
            ])
            .send()
            .await?;

        let bytes = error_for_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Turn a non-2xx response into [`ComfyUIApiError::ApiError`], keeping the
/// body text for the log.
async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ComfyUIApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ComfyUIApiError::ApiError {
        status: status.as_u16(),
        body,
    })
}
