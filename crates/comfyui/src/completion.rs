//! WebSocket message loop that waits for one prompt to finish.
//!
//! Reads raw frames from a ComfyUI WebSocket connection and parses them
//! into [`ServerEvent`]s. Everything is logged and
//! discarded until the completion signal for the awaited prompt arrives.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::client::ComfyUIClientError;
use crate::messages::{parse_event, ServerEvent};

/// Consume frames from `ws_stream` until ComfyUI signals that `prompt_id`
/// has finished (`executing` with a null node).
///
/// Unknown or malformed text frames and binary frames (previews) are
/// ignored. An `execution_error` is logged but does not end the wait;
/// ComfyUI still emits the completion signal afterwards. The loop has no
/// deadline of its own: callers bound it with a timeout.
///
/// Returns [`ComfyUIClientError::Protocol`] if the stream closes or fails
/// before completion.
pub async fn wait_for_completion<S>(ws_stream: &mut S, prompt_id: &str) -> Result<(), ComfyUIClientError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = ws_stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if handle_text_message(&text, prompt_id) {
                    return Ok(());
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!(prompt_id, "Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::warn!(prompt_id, ?frame, "ComfyUI WebSocket closed before completion");
                return Err(ComfyUIClientError::Protocol(format!(
                    "connection closed before prompt {prompt_id} completed"
                )));
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(prompt_id, error = %e, "WebSocket receive error");
                return Err(ComfyUIClientError::Protocol(format!(
                    "receive failed while waiting for prompt {prompt_id}: {e}"
                )));
            }
        }
    }

    Err(ComfyUIClientError::Protocol(format!(
        "stream ended before prompt {prompt_id} completed"
    )))
}

/// Log a single text frame. Returns `true` if it is the completion
/// signal for `prompt_id`.
fn handle_text_message(text: &str, prompt_id: &str) -> bool {
    let event = match parse_event(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::trace!(error = %e, raw_message = %text, "Skipping malformed ComfyUI message");
            return false;
        }
    };

    if event.completes(prompt_id) {
        tracing::info!(prompt_id, "Execution completed (all nodes done)");
        return true;
    }

    if let Some(other) = event.prompt_id().filter(|id| *id != prompt_id) {
        tracing::trace!(prompt_id, other_prompt = other, "Ignoring event for another prompt");
        return false;
    }

    match event {
        ServerEvent::Progress(progress) => {
            tracing::debug!(
                prompt_id,
                node = progress.node.as_deref().unwrap_or("-"),
                value = progress.value,
                max = progress.max,
                percent = progress.percent(),
                "Generation progress",
            );
        }
        ServerEvent::Started { prompt_id: started } => {
            tracing::info!(prompt_id = %started, "Execution started");
        }
        ServerEvent::NodeRunning { prompt_id: running, node } => {
            tracing::debug!(prompt_id = running.as_deref().unwrap_or("-"), node = %node, "Executing node");
        }
        ServerEvent::Finished { .. } => {
            tracing::debug!(prompt_id, "Finished signal without a prompt id");
        }
        ServerEvent::NodeOutput { prompt_id: owner, node } => {
            tracing::debug!(prompt_id = %owner, node = %node, "Node executed with output");
        }
        ServerEvent::Failed(failure) => {
            tracing::error!(
                prompt_id = %failure.prompt_id,
                node_id = failure.node_id.as_deref().unwrap_or("-"),
                node_type = failure.node_type.as_deref().unwrap_or("-"),
                error_type = %failure.exception_type,
                error_message = %failure.exception_message,
                "Execution error",
            );
        }
        ServerEvent::Cached { prompt_id: owner, nodes } => {
            tracing::debug!(prompt_id = %owner, cached = nodes.len(), "Execution used cache");
        }
        ServerEvent::Succeeded { prompt_id: owner } => {
            tracing::debug!(prompt_id = %owner, "Execution succeeded");
        }
        ServerEvent::QueueStatus { queue_remaining } => {
            tracing::debug!(?queue_remaining, "ComfyUI queue status");
        }
        ServerEvent::Other(kind) => {
            tracing::trace!(kind = %kind, "Ignoring ComfyUI event");
        }
    }
    false
}
