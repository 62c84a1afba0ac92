//! WebSocket side of the ComfyUI protocol.
//!
//! ComfyUI pushes execution events only to the socket whose `clientId`
//! matches the `client_id` a prompt was submitted with. [`ComfyUIClient`]
//! owns that id for the life of the process; each job opens its own
//! [`ComfyUIConnection`] with it and closes the connection when done.

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::completion::wait_for_completion;

/// Socket type returned by `connect_async` for `ws://` and `wss://` URLs.
pub type ComfyUIStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens event sockets for one ComfyUI instance.
///
/// Cheap to clone; clones share the client id, so prompts submitted under
/// it report to sockets opened by any clone.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    client_id: String,
    ws_url: String,
}

/// One open event socket. Must be [`close`](Self::close)d; dropping it
/// only tears down the TCP stream.
pub struct ComfyUIConnection {
    client_id: String,
    ws_stream: ComfyUIStream,
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// The handshake with `/ws` did not succeed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The socket closed, failed, or ran dry before the awaited signal.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ComfyUIClient {
    /// * `ws_url` - base URL such as `ws://127.0.0.1:8188`.
    ///
    /// A UUID v4 client id is generated here and never changes.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self::with_client_id(uuid::Uuid::new_v4().to_string(), ws_url)
    }

    pub fn with_client_id(client_id: impl Into<String>, ws_url: impl Into<String>) -> Self {
        let mut ws_url = ws_url.into();
        while ws_url.ends_with('/') {
            ws_url.pop();
        }
        Self {
            client_id: client_id.into(),
            ws_url,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Full socket address: `{ws_url}/ws?clientId={client_id}`.
    pub fn socket_url(&self) -> String {
        format!("{}/ws?clientId={}", self.ws_url, self.client_id)
    }

    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let (ws_stream, _response) = connect_async(self.socket_url()).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(client_id = %self.client_id, ws_url = %self.ws_url, "Connected to ComfyUI");

        Ok(ComfyUIConnection {
            client_id: self.client_id.clone(),
            ws_stream,
        })
    }
}

impl ComfyUIConnection {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Read events until `prompt_id` finishes. See [`wait_for_completion`].
    pub async fn wait_for_completion(&mut self, prompt_id: &str) -> Result<(), ComfyUIClientError> {
        wait_for_completion(&mut self.ws_stream, prompt_id).await
    }

    /// Send a close frame. A failed close is logged and otherwise ignored.
    pub async fn close(mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(client_id = %self.client_id, error = %e, "WebSocket close failed");
            return;
        }
        tracing::debug!(client_id = %self.client_id, "ComfyUI WebSocket closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_fixed_per_client() {
        let client = ComfyUIClient::new("ws://h:8188");
        let copy = client.clone();
        assert_eq!(client.client_id(), copy.client_id());
        assert!(uuid::Uuid::parse_str(client.client_id()).is_ok());

        let other = ComfyUIClient::new("ws://h:8188");
        assert_ne!(client.client_id(), other.client_id());
    }

    #[test]
    fn socket_url_carries_client_id() {
        let client = ComfyUIClient::with_client_id("abc", "ws://h:8188/");
        assert_eq!(client.socket_url(), "ws://h:8188/ws?clientId=abc");
    }

    #[tokio::test]
    async fn connect_refused_is_connection_error() {
        // Nothing listens on the discard port.
        let client = ComfyUIClient::new("ws://127.0.0.1:9");
        let result = client.connect().await;
        assert!(matches!(result, Err(ComfyUIClientError::Connection(_))));
    }
}
