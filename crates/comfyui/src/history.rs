//! Result-manifest parsing for `GET /history/{prompt_id}`.
//!
//! The history response is keyed by prompt id. Each entry maps output node
//! ids to whatever the node produced; video nodes (VideoHelperSuite's
//! `VHS_VideoCombine`) report their files under `gifs`, newer core nodes
//! under `videos`.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Output keys that carry video artifacts, in lookup order.
pub const VIDEO_OUTPUT_KEYS: &[&str] = &["gifs", "videos"];

/// One prompt's record in the history response.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    /// Node id -> node output, in the order ComfyUI reported them.
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

/// Execution status recorded alongside the outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// A video file produced by an output node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoArtifact {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub subfolder: String,
    /// Output folder kind (`output`, `temp`).
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
    #[serde(default)]
    pub format: Option<String>,
    /// Absolute path on the ComfyUI host, when the node reports it.
    #[serde(default)]
    pub fullpath: Option<String>,
}

fn default_folder_type() -> String {
    "output".to_string()
}

/// A video artifact together with the node that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVideo {
    pub node_id: String,
    pub artifact: VideoArtifact,
}

/// Errors while interpreting a history response.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The response has no record for the prompt.
    #[error("History has no entry for prompt {0}")]
    MissingEntry(String),

    /// The record or an artifact descriptor has an unexpected shape.
    #[error("Malformed history for prompt {prompt_id}: {source}")]
    Malformed {
        prompt_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Extract the entry for `prompt_id` from a raw history response.
pub fn find_entry(history: &Value, prompt_id: &str) -> Result<HistoryEntry, HistoryError> {
    let raw = history
        .get(prompt_id)
        .ok_or_else(|| HistoryError::MissingEntry(prompt_id.to_string()))?;
    serde_json::from_value(raw.clone()).map_err(|source| HistoryError::Malformed {
        prompt_id: prompt_id.to_string(),
        source,
    })
}

impl HistoryEntry {
    /// The first artifact of the first node (in manifest order) that
    /// exposes a non-empty video list.
    pub fn first_video(&self, prompt_id: &str) -> Result<Option<NodeVideo>, HistoryError> {
        for (node_id, output) in &self.outputs {
            let first = VIDEO_OUTPUT_KEYS
                .iter()
                .filter_map(|key| output.get(*key).and_then(Value::as_array))
                .find_map(|list| list.first());

            if let Some(raw) = first {
                let artifact: VideoArtifact =
                    serde_json::from_value(raw.clone()).map_err(|source| {
                        HistoryError::Malformed {
                            prompt_id: prompt_id.to_string(),
                            source,
                        }
                    })?;
                return Ok(Some(NodeVideo {
                    node_id: node_id.clone(),
                    artifact,
                }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn gif(name: &str) -> Value {
        json!({
            "filename": name,
            "subfolder": "",
            "type": "output",
            "format": "video/h264-mp4",
            "frame_rate": 16.0,
            "workflow": format!("{name}.png"),
            "fullpath": format!("/comfyui/output/{name}"),
        })
    }

    #[test]
    fn finds_entry_by_prompt_id() {
        let history = json!({"p1": {"outputs": {}, "status": {"status_str": "success", "completed": true}}});
        let entry = find_entry(&history, "p1").unwrap();
        assert!(entry.outputs.is_empty());
        let status = entry.status.unwrap();
        assert!(status.completed);
        assert_eq!(status.status_str.as_deref(), Some("success"));
    }

    #[test]
    fn missing_entry_is_error() {
        assert_matches!(
            find_entry(&json!({}), "p1"),
            Err(HistoryError::MissingEntry(ref id)) if id == "p1"
        );
    }

    #[test]
    fn first_non_empty_video_list_wins_in_manifest_order() {
        let history = json!({"p1": {"outputs": {
            "50": {"images": [{"filename": "preview.png"}]},
            "131": {"gifs": []},
            "540": {"gifs": [gif("first.mp4"), gif("second.mp4")]},
            "12": {"gifs": [gif("later.mp4")]},
        }}});

        let entry = find_entry(&history, "p1").unwrap();
        let video = entry.first_video("p1").unwrap().unwrap();

        assert_eq!(video.node_id, "540");
        assert_eq!(video.artifact.filename.as_deref(), Some("first.mp4"));
        assert_eq!(video.artifact.fullpath.as_deref(), Some("/comfyui/output/first.mp4"));
        assert_eq!(video.artifact.folder_type, "output");
    }

    #[test]
    fn videos_key_is_recognized() {
        let history = json!({"p1": {"outputs": {
            "7": {"videos": [{"filename": "clip.mp4", "subfolder": "wan", "type": "output"}]},
        }}});

        let video = find_entry(&history, "p1")
            .unwrap()
            .first_video("p1")
            .unwrap()
            .unwrap();

        assert_eq!(video.node_id, "7");
        assert_eq!(video.artifact.subfolder, "wan");
        assert!(video.artifact.fullpath.is_none());
    }

    #[test]
    fn no_videos_anywhere_is_none() {
        let history = json!({"p1": {"outputs": {
            "50": {"images": [{"filename": "preview.png"}]},
            "131": {"gifs": []},
        }}});

        let entry = find_entry(&history, "p1").unwrap();
        assert_eq!(entry.first_video("p1").unwrap(), None);
    }

    #[test]
    fn malformed_artifact_is_error() {
        let history = json!({"p1": {"outputs": {"9": {"gifs": ["just-a-string"]}}}});
        let entry = find_entry(&history, "p1").unwrap();
        assert_matches!(entry.first_video("p1"), Err(HistoryError::Malformed { .. }));
    }
}
