//! Input image materialization.
//!
//! A job declares its image either as a path the backend can already read,
//! a URL, or an inline base64 payload. [`InputMaterializer::materialize`]
//! turns any of them into a local absolute path inside the job's
//! [`JobWorkspace`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CoreError;

/// File name used for downloaded and decoded input images.
pub const INPUT_IMAGE_FILENAME: &str = "input_image.jpg";

/// Default program used to fetch URL inputs.
pub const DEFAULT_DOWNLOAD_PROGRAM: &str = "wget";

// ---------------------------------------------------------------------------
// Source kinds
// ---------------------------------------------------------------------------

/// The declared encoding of an input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSourceKind {
    /// `image_path`: a file already on the worker's filesystem.
    Path,
    /// `image_url`: fetched with the download program.
    Url,
    /// `image_base64`: raw base64 or a `data:` URI.
    Base64,
}

impl ImageSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Url => "url",
            Self::Base64 => "base64",
        }
    }
}

impl FromStr for ImageSourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(Self::Path),
            "url" => Ok(Self::Url),
            "base64" => Ok(Self::Base64),
            other => Err(CoreError::UnsupportedInput(format!(
                "'{other}'. Valid types: path, url, base64"
            ))),
        }
    }
}

/// An input image together with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Already resolvable by the backend; used as-is.
    Path(String),
    /// Remote resource fetched into the job workspace.
    Url(String),
    /// Inline base64 (optionally a `data:` URI) decoded into the job workspace.
    Base64(String),
}

impl ImageSource {
    /// Build a source from a declared kind string and its payload.
    pub fn from_kind(kind: &str, payload: impl Into<String>) -> Result<Self, CoreError> {
        let payload = payload.into();
        Ok(match kind.parse::<ImageSourceKind>()? {
            ImageSourceKind::Path => Self::Path(payload),
            ImageSourceKind::Url => Self::Url(payload),
            ImageSourceKind::Base64 => Self::Base64(payload),
        })
    }

    pub fn kind(&self) -> ImageSourceKind {
        match self {
            Self::Path(_) => ImageSourceKind::Path,
            Self::Url(_) => ImageSourceKind::Url,
            Self::Base64(_) => ImageSourceKind::Base64,
        }
    }

    /// Name of the job input field this source comes from.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Path(_) => "image_path",
            Self::Url(_) => "image_url",
            Self::Base64(_) => "image_base64",
        }
    }
}

// ---------------------------------------------------------------------------
// Per-job workspace
// ---------------------------------------------------------------------------

/// Scratch directory owned by a single job, named `task_<uuid>`.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    dir: PathBuf,
}

impl JobWorkspace {
    /// Allocate a fresh workspace path under `root`. Nothing is created on
    /// disk until [`ensure_exists`](Self::ensure_exists).
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(format!("task_{}", uuid::Uuid::new_v4())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if absent and return its absolute path.
    pub async fn ensure_exists(&self) -> Result<PathBuf, CoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(tokio::fs::canonicalize(&self.dir).await?)
    }

    /// Remove the workspace and everything in it. Missing is not an error.
    pub async fn remove(&self) -> Result<(), CoreError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Materializer
// ---------------------------------------------------------------------------

/// Resolves [`ImageSource`]s into local files.
#[derive(Debug, Clone)]
pub struct InputMaterializer {
    download_program: String,
    leading_args: Vec<String>,
}

impl Default for InputMaterializer {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_PROGRAM)
    }
}

impl InputMaterializer {
    /// * `download_program` - executable invoked as
    ///   `<program> -O <dest> --no-verbose <url>` (wget-compatible).
    pub fn new(download_program: impl Into<String>) -> Self {
        Self {
            download_program: download_program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Like [`new`](Self::new), with extra arguments placed before the
    /// wget-style ones (e.g. `sh /path/to/script`).
    pub fn with_args(download_program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            download_program: download_program.into(),
            leading_args,
        }
    }

    /// Produce a local path holding the image bytes for `source`.
    ///
    /// The workspace directory is created first for every kind.
    pub async fn materialize(
        &self,
        source: &ImageSource,
        workspace: &JobWorkspace,
    ) -> Result<PathBuf, CoreError> {
        let dir = workspace.ensure_exists().await?;
        let dest = dir.join(INPUT_IMAGE_FILENAME);

        match source {
            ImageSource::Path(path) => Ok(PathBuf::from(path)),
            ImageSource::Url(url) => {
                self.download(url, &dest).await?;
                Ok(dest)
            }
            ImageSource::Base64(data) => {
                let bytes = decode_base64(data)?;
                tokio::fs::write(&dest, bytes).await?;
                Ok(dest)
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), CoreError> {
        tracing::debug!(url, dest = %dest.display(), "Downloading input image");

        let output = tokio::process::Command::new(&self.download_program)
            .args(&self.leading_args)
            .arg("-O")
            .arg(dest)
            .arg("--no-verbose")
            .arg(url)
            .output()
            .await
            .map_err(|e| {
                CoreError::Download(format!(
                    "could not run '{}': {e}",
                    self.download_program
                ))
            })?;

        if !output.status.success() {
            return Err(CoreError::Download(format!(
                "{url} (exit code {:?}): {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Decode an inline image payload.
///
/// Accepts plain standard base64 or a `data:<mime>;base64,` URI; ASCII
/// whitespace anywhere in the payload is ignored.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, CoreError> {
    let data = match data.trim_start().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .ok_or_else(|| CoreError::Decode("data URI is not base64-encoded".to_string()))?,
        None => data,
    };
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CoreError::Decode(e.to_string()))?;
    if bytes.is_empty() {
        return Err(CoreError::Decode("payload is empty".to_string()));
    }
    Ok(bytes)
}
