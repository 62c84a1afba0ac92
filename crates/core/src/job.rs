//! Job request model and validation.
//!
//! The queue runtime hands the worker an `input` object with loosely typed
//! fields. [`JobRequest::from_input`] turns it into a validated request:
//! exactly one image source, normalized dimensions, and generation
//! parameters with defaults applied.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::input::ImageSource;
use crate::resolution::{normalize_dimension, numeric_value, whole_number};

// ---------------------------------------------------------------------------
// Generation defaults
// ---------------------------------------------------------------------------

/// Number of frames generated when `length` is omitted.
pub const DEFAULT_LENGTH: u32 = 81;
/// Seed used when `seed` is omitted.
pub const DEFAULT_SEED: u64 = 42;
/// Classifier-free guidance scale used when `cfg` is omitted.
pub const DEFAULT_CFG: f64 = 5.0;
/// Frames shared between context windows when `context_overlap` is omitted.
pub const DEFAULT_CONTEXT_OVERLAP: u32 = 48;

/// Message returned to the caller when the backend produced no video.
pub const NO_VIDEO_FOUND: &str = "Nenhum vídeo encontrado.";

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// Prefix of the image source fields: `image_<kind>` where `<kind>` is an
/// [`ImageSourceKind`](crate::input::ImageSourceKind) name.
pub const IMAGE_FIELD_PREFIX: &str = "image_";

/// Generation fields of the `input` object as the queue runtime delivers
/// them. Image fields are read separately by [`JobRequest::from_input`].
///
/// Numeric fields stay untyped: callers send integers, integral floats
/// (`33.0`) and numeric strings interchangeably.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobInput {
    pub width: Option<Value>,
    pub height: Option<Value>,
    pub length: Option<Value>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub seed: Option<Value>,
    pub cfg: Option<Value>,
    pub context_overlap: Option<Value>,
}

// ---------------------------------------------------------------------------
// Validated request
// ---------------------------------------------------------------------------

/// Values written into the workflow graph, defaults already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub width: i64,
    pub height: i64,
    pub length: u32,
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: u64,
    pub cfg: f64,
    pub context_overlap: u32,
}

/// A fully validated job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub image: ImageSource,
    pub params: GenerationParams,
}

impl JobRequest {
    /// Parse and validate a raw `input` object.
    ///
    /// Fails with [`CoreError::Validation`] when the object is malformed,
    /// when zero or several image sources are present, or when a numeric
    /// field cannot be coerced. An `image_<kind>` field with an unknown
    /// kind fails with [`CoreError::UnsupportedInput`].
    pub fn from_input(input: &Value) -> Result<Self, CoreError> {
        let Value::Object(fields) = input else {
            return Err(CoreError::Validation(
                "Job input must be a JSON object".to_string(),
            ));
        };
        let image = select_image_source(fields)?;

        let raw: JobInput = serde_json::from_value(input.clone())
            .map_err(|e| CoreError::Validation(format!("Malformed job input: {e}")))?;
        let params = raw.into_params()?;

        Ok(Self { image, params })
    }
}

impl JobInput {
    /// Coerce every field and apply defaults.
    pub fn into_params(self) -> Result<GenerationParams, CoreError> {
        Ok(GenerationParams {
            width: required_dimension("width", self.width.as_ref())?,
            height: required_dimension("height", self.height.as_ref())?,
            length: optional_u32("length", self.length.as_ref(), DEFAULT_LENGTH)?,
            prompt: self.prompt.unwrap_or_default(),
            negative_prompt: self.negative_prompt.unwrap_or_default(),
            seed: match &self.seed {
                Some(value) => whole_number("seed", value)?,
                None => DEFAULT_SEED,
            },
            cfg: optional_f64("cfg", self.cfg.as_ref(), DEFAULT_CFG)?,
            context_overlap: optional_u32(
                "context_overlap",
                self.context_overlap.as_ref(),
                DEFAULT_CONTEXT_OVERLAP,
            )?,
        })
    }
}

/// Pick the single image source out of the raw input.
///
/// Every `image_<kind>` field is parsed through [`ImageSource::from_kind`].
/// `null` and blank strings count as absent.
fn select_image_source(fields: &Map<String, Value>) -> Result<ImageSource, CoreError> {
    let mut present: Vec<ImageSource> = Vec::with_capacity(1);

    for (field, value) in fields {
        let Some(kind) = field.strip_prefix(IMAGE_FIELD_PREFIX) else {
            continue;
        };
        let payload = match value {
            Value::Null => continue,
            Value::String(s) if s.trim().is_empty() => continue,
            Value::String(s) => s.clone(),
            other => {
                return Err(CoreError::Validation(format!(
                    "'{field}' must be a string, got {other}"
                )))
            }
        };
        present.push(ImageSource::from_kind(kind, payload)?);
    }

    match present.len() {
        0 => Err(CoreError::Validation(
            "No input image provided: expected one of image_path, image_url, image_base64"
                .to_string(),
        )),
        1 => Ok(present.remove(0)),
        _ => Err(CoreError::Validation(format!(
            "Exactly one image source is allowed, got: {}",
            present
                .iter()
                .map(ImageSource::field_name)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn required_dimension(field: &str, value: Option<&Value>) -> Result<i64, CoreError> {
    let value =
        value.ok_or_else(|| CoreError::Validation(format!("Missing required field '{field}'")))?;
    normalize_dimension(field, value)
}

fn optional_u32(field: &str, value: Option<&Value>, default: u32) -> Result<u32, CoreError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let n = whole_number(field, value)?;
    u32::try_from(n)
        .map_err(|_| CoreError::Validation(format!("'{field}' is out of range: {n}")))
}

fn optional_f64(field: &str, value: Option<&Value>, default: f64) -> Result<f64, CoreError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let n = numeric_value(field, value)?;
    if !n.is_finite() {
        return Err(CoreError::Validation(format!("'{field}' must be finite, got {value}")));
    }
    Ok(n)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Result handed back to the queue runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobOutput {
    /// The produced video, base64-encoded.
    Video { video_base64: String },
    /// The backend finished but produced no video artifact.
    NotFound { error: String },
}

impl JobOutput {
    pub fn not_found() -> Self {
        Self::NotFound {
            error: NO_VIDEO_FOUND.to_string(),
        }
    }
}
