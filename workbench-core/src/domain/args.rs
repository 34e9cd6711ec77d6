//! Model argument values

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Argument key holding the directory a model writes its outputs to
pub const WORKSPACE_DIR_KEY: &str = "workspace_dir";

/// Argument key holding the optional suffix appended to output filenames
pub const RESULTS_SUFFIX_KEY: &str = "results_suffix";

/// Argument key holding the worker count passed through to the model
pub const N_WORKERS_KEY: &str = "n_workers";

/// Mapping from argument key to value, ordered by key
pub type ArgsValues = BTreeMap<String, ArgValue>;

/// A single model argument value
///
/// Numbers hold a parsed JSON number, so a numeric value always writes as a
/// JSON number and reads back equal to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub enum ArgValue {
    String(String),
    Bool(bool),
    Number(serde_json::Number),
}

impl ArgValue {
    /// Creates a numeric value from its textual form
    ///
    /// Returns `None` if the text is not a valid JSON number.
    pub fn number(text: &str) -> Option<Self> {
        serde_json::from_str(text.trim()).ok().map(Self::Number)
    }

    /// Returns the string content if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for an empty string value
    pub fn is_blank(&self) -> bool {
        matches!(self, ArgValue::String(s) if s.trim().is_empty())
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::String(s) => write!(f, "{}", s),
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Number(n.into())
    }
}

impl TryFrom<JsonValue> for ArgValue {
    type Error = String;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::String(s) => Ok(ArgValue::String(s)),
            JsonValue::Bool(b) => Ok(ArgValue::Bool(b)),
            JsonValue::Number(n) => Ok(ArgValue::Number(n)),
            // Unset inputs are saved as null by some versions of the tool
            JsonValue::Null => Ok(ArgValue::String(String::new())),
            other => Err(format!(
                "unsupported argument value (expected string, boolean or number): {}",
                other
            )),
        }
    }
}

impl From<ArgValue> for JsonValue {
    fn from(value: ArgValue) -> Self {
        match value {
            ArgValue::String(s) => JsonValue::String(s),
            ArgValue::Bool(b) => JsonValue::Bool(b),
            ArgValue::Number(n) => JsonValue::Number(n),
        }
    }
}
