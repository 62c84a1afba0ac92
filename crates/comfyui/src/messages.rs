//! Typed view of the ComfyUI WebSocket event stream.
//!
//! Every text frame has the shape `{"type": "<kind>", "data": {...}}`.
//! [`parse_event`] reads the envelope first and then decodes `data` for the
//! kinds the worker reacts to. Kinds it has no use for (custom node
//! extensions, `progress_state`, crystools monitors, ...) become
//! [`ServerEvent::Other`] rather than parse errors.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// One decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// `status`: queue depth broadcast. Sent on connect and whenever the
    /// queue changes.
    QueueStatus { queue_remaining: Option<u32> },

    /// `execution_start`
    Started { prompt_id: String },

    /// `execution_cached`: nodes whose outputs were reused.
    Cached { prompt_id: String, nodes: Vec<String> },

    /// `executing` with a node id.
    NodeRunning { prompt_id: Option<String>, node: String },

    /// `executing` with a null node: every node of the prompt has run.
    /// This is the only completion signal the worker trusts.
    Finished { prompt_id: Option<String> },

    /// `progress`: sampler steps within a node.
    Progress(Progress),

    /// `executed`: a node produced output.
    NodeOutput { prompt_id: String, node: String },

    /// `execution_success` (newer servers). Informational only.
    Succeeded { prompt_id: String },

    /// `execution_error`
    Failed(ExecutionFailure),

    /// Any other kind, by name.
    Other(String),
}

impl ServerEvent {
    /// `true` if this is the end-of-execution signal for `prompt_id`.
    pub fn completes(&self, prompt_id: &str) -> bool {
        matches!(self, ServerEvent::Finished { prompt_id: Some(id) } if id == prompt_id)
    }

    /// Prompt the event belongs to, when it carries one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            ServerEvent::Started { prompt_id }
            | ServerEvent::Cached { prompt_id, .. }
            | ServerEvent::NodeOutput { prompt_id, .. }
            | ServerEvent::Succeeded { prompt_id } => Some(prompt_id),
            ServerEvent::NodeRunning { prompt_id, .. } | ServerEvent::Finished { prompt_id } => {
                prompt_id.as_deref()
            }
            ServerEvent::Progress(p) => p.prompt_id.as_deref(),
            ServerEvent::Failed(f) => Some(&f.prompt_id),
            ServerEvent::QueueStatus { .. } | ServerEvent::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Progress {
    pub value: u64,
    pub max: u64,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.max == 0 {
            return 0;
        }
        (self.value.min(self.max) * 100 / self.max) as u8
    }
}

/// Payload of an `execution_error` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionFailure {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub exception_type: String,
    #[serde(default)]
    pub exception_message: String,
}

#[derive(Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct StatusPayload {
    #[serde(default)]
    status: Option<QueueState>,
}

#[derive(Deserialize)]
struct QueueState {
    exec_info: ExecInfo,
}

#[derive(Deserialize)]
struct ExecInfo {
    queue_remaining: u32,
}

#[derive(Deserialize)]
struct PromptPayload {
    prompt_id: String,
}

#[derive(Deserialize)]
struct CachedPayload {
    prompt_id: String,
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Deserialize)]
struct ExecutingPayload {
    node: Option<String>,
    #[serde(default)]
    prompt_id: Option<String>,
}

#[derive(Deserialize)]
struct ExecutedPayload {
    node: String,
    prompt_id: String,
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(data)
}

/// Decode one text frame.
///
/// Fails only for frames that are not JSON objects with a string `type`,
/// or whose `data` does not fit a kind this module knows.
pub fn parse_event(text: &str) -> Result<ServerEvent, serde_json::Error> {
    let Frame { kind, data } = serde_json::from_str(text)?;

    let event = match kind.as_str() {
        "status" => {
            let p: StatusPayload = payload(data)?;
            ServerEvent::QueueStatus {
                queue_remaining: p.status.map(|s| s.exec_info.queue_remaining),
            }
        }
        "execution_start" => ServerEvent::Started {
            prompt_id: payload::<PromptPayload>(data)?.prompt_id,
        },
        "execution_cached" => {
            let p: CachedPayload = payload(data)?;
            ServerEvent::Cached {
                prompt_id: p.prompt_id,
                nodes: p.nodes,
            }
        }
        "executing" => {
            let p: ExecutingPayload = payload(data)?;
            match p.node {
                Some(node) => ServerEvent::NodeRunning {
                    prompt_id: p.prompt_id,
                    node,
                },
                None => ServerEvent::Finished {
                    prompt_id: p.prompt_id,
                },
            }
        }
        "progress" => ServerEvent::Progress(payload(data)?),
        "executed" => {
            let p: ExecutedPayload = payload(data)?;
            ServerEvent::NodeOutput {
                prompt_id: p.prompt_id,
                node: p.node,
            }
        }
        "execution_success" => ServerEvent::Succeeded {
            prompt_id: payload::<PromptPayload>(data)?.prompt_id,
        },
        "execution_error" => ServerEvent::Failed(payload(data)?),
        _ => ServerEvent::Other(kind),
    };

    Ok(event)
}
