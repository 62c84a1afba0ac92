//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, WebSocket connection handling, the
//! completion wait loop, HTTP API wrappers, and result-manifest (history)
//! parsing for driving a single ComfyUI server.

pub mod api;
pub mod client;
pub mod completion;
pub mod history;
pub mod messages;
