/// A ComfyUI workflow graph in API format: node id -> node definition.
pub type WorkflowGraph = serde_json::Map<String, serde_json::Value>;

/// Server-assigned identifier for a queued prompt.
pub type PromptId = String;
