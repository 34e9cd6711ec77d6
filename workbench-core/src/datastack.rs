//! Datastack serialization
//!
//! A datastack is the JSON document a model executable reads its arguments
//! from (`-d <path>`). Required top-level keys are `args`, `model_name` and
//! `invest_version`; unknown keys are ignored so that files written by newer
//! versions still load.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::args::ArgsValues;

/// Errors raised while reading or writing a datastack
#[derive(Debug, Error)]
pub enum DatastackError {
    /// The payload is not a usable datastack
    #[error("Malformed datastack: {0}")]
    MalformedDatastack(String),

    /// The payload could not be encoded
    #[error("Failed to encode datastack: {0}")]
    Encode(#[from] serde_json::Error),

    /// Reading or writing the datastack file failed
    #[error("Datastack I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DatastackError>;

/// The on-disk datastack document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datastack {
    pub args: ArgsValues,
    pub model_name: String,
    pub invest_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_human_name: Option<String>,
}

impl Datastack {
    pub fn new(args: ArgsValues, model_run_name: impl Into<String>, tool_version: impl Into<String>) -> Self {
        Self {
            args,
            model_name: model_run_name.into(),
            invest_version: tool_version.into(),
            model_human_name: None,
        }
    }

    pub fn with_human_name(mut self, name: Option<String>) -> Self {
        self.model_human_name = name;
        self
    }
}

/// A datastack parsed back into the pieces a job is built from
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDatastack {
    pub model_run_name: String,
    pub model_human_name: Option<String>,
    pub args: ArgsValues,
    pub invest_version: String,
}

const REQUIRED_KEYS: [&str; 3] = ["args", "model_name", "invest_version"];

/// Encodes an argument map as a datastack payload
pub fn to_payload(args: &ArgsValues, model_run_name: &str, tool_version: &str) -> Result<Vec<u8>> {
    encode(&Datastack::new(args.clone(), model_run_name, tool_version))
}

/// Encodes a prepared datastack document
pub fn encode(datastack: &Datastack) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(datastack)?)
}

/// Parses a datastack payload
///
/// Fails with [`DatastackError::MalformedDatastack`] when the payload is not
/// a JSON object, lacks a required key, or holds values of the wrong shape.
pub fn from_payload(bytes: &[u8]) -> Result<LoadedDatastack> {
    let value: JsonValue = serde_json::from_slice(bytes)
        .map_err(|e| DatastackError::MalformedDatastack(format!("not valid JSON: {}", e)))?;

    let object = value.as_object().ok_or_else(|| {
        DatastackError::MalformedDatastack("top level is not a JSON object".to_string())
    })?;

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(DatastackError::MalformedDatastack(format!(
            "missing required key(s): {}",
            missing.join(", ")
        )));
    }

    let datastack: Datastack = serde_json::from_value(value)
        .map_err(|e| DatastackError::MalformedDatastack(e.to_string()))?;

    if datastack.model_name.trim().is_empty() {
        return Err(DatastackError::MalformedDatastack(
            "model_name is empty".to_string(),
        ));
    }

    Ok(LoadedDatastack {
        model_run_name: datastack.model_name,
        model_human_name: datastack.model_human_name,
        args: datastack.args,
        invest_version: datastack.invest_version,
    })
}

/// Writes a datastack document to `path`
pub fn write_to_path(path: &Path, datastack: &Datastack) -> Result<()> {
    let bytes = encode(datastack)?;
    std::fs::write(path, bytes).map_err(|source| DatastackError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and parses a datastack file
pub fn read_from_path(path: &Path) -> Result<LoadedDatastack> {
    let bytes = std::fs::read(path).map_err(|source| DatastackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_payload(&bytes)
}
