//! Queue worker that turns one image-to-video job into one ComfyUI run.
//!
//! [`handler::Orchestrator`] owns the per-job sequence (materialize input,
//! patch workflow, submit, wait, fetch result); [`runner`] adapts it to the
//! job envelope the queue runtime exchanges.

pub mod config;
pub mod error;
pub mod handler;
pub mod runner;
