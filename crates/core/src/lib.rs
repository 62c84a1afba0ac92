//! Domain logic for the image-to-video worker.
//!
//! Everything here is independent of the ComfyUI transport: job request
//! parsing, dimension normalization, input image materialization, and the
//! workflow parameter table.

pub mod error;
pub mod input;
pub mod job;
pub mod resolution;
pub mod types;
pub mod workflow;
