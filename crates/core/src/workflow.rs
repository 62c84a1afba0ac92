//! Workflow template loading and parameter injection.
//!
//! The worker drives one fixed ComfyUI graph (Wan 2.2 image-to-video). Job
//! values land in hard-wired node inputs listed in [`PARAMETER_BINDINGS`].
//! The template and this table must agree; [`Workflow::validate`] checks
//! every binding up front and reports all mismatches at once.

use std::path::Path;

use serde_json::Value;

use crate::error::CoreError;
use crate::job::GenerationParams;
use crate::types::WorkflowGraph;

/// Default location of the workflow template inside the worker image.
pub const DEFAULT_WORKFLOW_PATH: &str = "/new_Wan22_api.json";

// ---------------------------------------------------------------------------
// Parameter table
// ---------------------------------------------------------------------------

/// A job-derived value that is written into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    InputImage,
    Length,
    Prompt,
    NegativePrompt,
    Seed,
    Cfg,
    Width,
    Height,
    ContextOverlap,
}

/// Where a [`Parameter`] is written: `graph[node_id]["inputs"][input]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterBinding {
    pub parameter: Parameter,
    pub node_id: &'static str,
    pub input: &'static str,
}

const fn bind(parameter: Parameter, node_id: &'static str, input: &'static str) -> ParameterBinding {
    ParameterBinding {
        parameter,
        node_id,
        input,
    }
}

/// Every node input the worker overwrites. The seed feeds two samplers.
pub const PARAMETER_BINDINGS: &[ParameterBinding] = &[
    bind(Parameter::InputImage, "244", "image"),
    bind(Parameter::Length, "541", "num_frames"),
    bind(Parameter::Prompt, "135", "positive_prompt"),
    bind(Parameter::NegativePrompt, "135", "negative_prompt"),
    bind(Parameter::Seed, "220", "seed"),
    bind(Parameter::Seed, "540", "seed"),
    bind(Parameter::Cfg, "540", "cfg"),
    bind(Parameter::Width, "235", "value"),
    bind(Parameter::Height, "236", "value"),
    bind(Parameter::ContextOverlap, "498", "context_overlap"),
];

impl ParameterBinding {
    /// `node.input` label used in error messages.
    pub fn label(&self) -> String {
        format!("{}.{}", self.node_id, self.input)
    }
}

/// Resolve the JSON value for `parameter` from the job.
pub fn parameter_value(parameter: Parameter, image_path: &Path, params: &GenerationParams) -> Value {
    match parameter {
        Parameter::InputImage => Value::from(image_path.to_string_lossy().into_owned()),
        Parameter::Length => Value::from(params.length),
        Parameter::Prompt => Value::from(params.prompt.clone()),
        Parameter::NegativePrompt => Value::from(params.negative_prompt.clone()),
        Parameter::Seed => Value::from(params.seed),
        Parameter::Cfg => Value::from(params.cfg),
        Parameter::Width => Value::from(params.width),
        Parameter::Height => Value::from(params.height),
        Parameter::ContextOverlap => Value::from(params.context_overlap),
    }
}

// ---------------------------------------------------------------------------
// Workflow graph
// ---------------------------------------------------------------------------

/// A workflow graph owned by one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    graph: WorkflowGraph,
}

impl Workflow {
    /// Read and parse the template. Called once per job; graphs are never
    /// shared between jobs.
    pub async fn load(path: &Path) -> Result<Self, CoreError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }

    /// Parse template text. Must be a JSON object keyed by node id.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Workflow template is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Wrap an already-parsed template. Non-objects are rejected.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(graph) => Ok(Self { graph }),
            other => Err(CoreError::Validation(format!(
                "Workflow template must be a JSON object of nodes, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Node map as it currently stands, parameters included once applied.
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// The graph as the `prompt` body for `POST /prompt`.
    pub fn into_value(self) -> Value {
        Value::Object(self.graph)
    }

    /// Check that every binding points at an existing node with an
    /// `inputs` object. The input key itself may be absent (it is created
    /// on apply).
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut missing: Vec<String> = Vec::new();
        for binding in PARAMETER_BINDINGS {
            let has_inputs = self
                .graph
                .get(binding.node_id)
                .and_then(|node| node.get("inputs"))
                .is_some_and(Value::is_object);
            if !has_inputs {
                missing.push(binding.label());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::SchemaMismatch { missing })
        }
    }

    /// Validate, then write every bound parameter into the graph.
    pub fn apply(&mut self, image_path: &Path, params: &GenerationParams) -> Result<(), CoreError> {
        self.validate()?;

        for binding in PARAMETER_BINDINGS {
            let value = parameter_value(binding.parameter, image_path, params);
            // validate() guarantees the node and its inputs object exist.
            if let Some(inputs) = self
                .graph
                .get_mut(binding.node_id)
                .and_then(|node| node.get_mut("inputs"))
                .and_then(Value::as_object_mut)
            {
                inputs.insert(binding.input.to_string(), value);
            }
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
