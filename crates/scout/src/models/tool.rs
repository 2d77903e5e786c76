use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// A JSON Schema object defining the expected parameters for the tool
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool call request that the model wants executed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The parameters for the execution
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new ToolCall with the given name and parameters
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// What a tool handed back after being invoked
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Structured data produced by an executed tool
    Json(Value),
    /// The tool ran but has nothing to report
    Absent,
    /// A signal-only tool was called; the interface acts on the call itself
    Signal,
}

const SIGNAL_ACKNOWLEDGEMENT: &str =
    "The interface received this call and is displaying it to the user.";

impl ToolOutput {
    /// The text fed back into the model's context, if any
    pub fn model_content(&self) -> Option<String> {
        match self {
            ToolOutput::Json(value) => Some(value.to_string()),
            ToolOutput::Absent => None,
            ToolOutput::Signal => Some(SIGNAL_ACKNOWLEDGEMENT.to_string()),
        }
    }

    /// The result reported to the interface; signals have none
    pub fn client_result(&self) -> Option<Value> {
        match self {
            ToolOutput::Json(value) => Some(value.clone()),
            ToolOutput::Absent => Some(Value::Null),
            ToolOutput::Signal => None,
        }
    }
}
