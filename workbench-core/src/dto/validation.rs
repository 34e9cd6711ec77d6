//! Validation DTOs

use serde::{Deserialize, Serialize};

/// One problem reported by the provider
///
/// On the wire this is a two-element array: the affected argument keys,
/// then the message, e.g. `[["a", "b"], "is a required key"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Vec<String>, String)", into = "(Vec<String>, String)")]
pub struct ValidationIssue {
    pub keys: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new<K: Into<String>>(keys: impl IntoIterator<Item = K>, message: impl Into<String>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }
}

impl From<(Vec<String>, String)> for ValidationIssue {
    fn from((keys, message): (Vec<String>, String)) -> Self {
        Self { keys, message }
    }
}

impl From<ValidationIssue> for (Vec<String>, String) {
    fn from(issue: ValidationIssue) -> Self {
        (issue.keys, issue.message)
    }
}

/// Request body for validating an argument map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub model_module: String,
    /// The argument map, JSON-encoded as a string
    pub args: String,
}
