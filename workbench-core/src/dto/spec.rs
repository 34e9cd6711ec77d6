//! Model listing and argument specification DTOs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Available models keyed by display name
pub type ModelListing = BTreeMap<String, ModelInfo>;

/// One entry of the model listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The run name passed to the model executable
    pub internal_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Argument specification of one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Display name of the model
    pub model_name: String,
    /// Module identifier the provider validates against
    pub module: String,
    #[serde(default)]
    pub userguide_html: Option<String>,
    pub args: BTreeMap<String, ArgSpec>,
}

/// Specification of a single argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: String,
    #[serde(default)]
    pub about: Option<String>,
}
