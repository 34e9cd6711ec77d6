//! Argument validation aggregation
//!
//! Combines the provider's per-argument failures into a per-argument state
//! and a single run gate. Validity is bookkeeping kept beside the argument
//! values, never inside a [`JobRecord`](crate::domain::job::JobRecord).
//!
//! The gate is fail-closed: an argument that has not been validated since it
//! last changed counts as invalid.

use std::collections::BTreeMap;

use crate::domain::args::{ArgValue, ArgsValues};
use crate::dto::validation::ValidationIssue;

const BBOX_PATTERN: &str = "Bounding boxes do not intersect";
const BBOX_PREFIX: &str = "Bounding box does not intersect at least one other:";
const MESSAGE_SEPARATOR: &str = "; ";

/// Validation bookkeeping for one argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgState {
    /// Current value; `None` for keys only known from provider results
    pub value: Option<ArgValue>,
    /// Whether the user has changed this argument in this session
    pub touched: bool,
    pub valid: bool,
    pub message: Option<String>,
}

impl ArgState {
    fn unvalidated(value: Option<ArgValue>, touched: bool) -> Self {
        Self {
            value,
            touched,
            valid: false,
            message: None,
        }
    }
}

/// Validation state of a whole argument map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationState {
    args: BTreeMap<String, ArgState>,
    validated: bool,
}

impl ValidationState {
    /// Creates a state in which nothing has been validated yet
    pub fn new(args: &ArgsValues) -> Self {
        let args = args
            .iter()
            .map(|(key, value)| (key.clone(), ArgState::unvalidated(Some(value.clone()), false)))
            .collect();
        Self {
            args,
            validated: false,
        }
    }

    /// Records a changed value
    ///
    /// The argument is marked touched and stays invalid until the next
    /// [`apply`](Self::apply).
    pub fn set_value(&mut self, key: impl Into<String>, value: ArgValue) {
        let touched = ArgState::unvalidated(Some(value), true);
        self.args.insert(key.into(), touched);
    }

    /// Applies the provider's validation results
    ///
    /// Every known argument is recomputed from `issues` alone, so applying
    /// the same results twice yields the same state. Keys named by an issue
    /// but absent from the argument map are added as invalid.
    pub fn apply(&mut self, issues: &[ValidationIssue]) {
        for issue in issues {
            for key in &issue.keys {
                self.args
                    .entry(key.clone())
                    .or_insert_with(|| ArgState::unvalidated(None, false));
            }
        }

        for (key, state) in self.args.iter_mut() {
            let mut messages: Vec<String> = Vec::new();
            for issue in issues.iter().filter(|issue| issue.keys.contains(key)) {
                let message = narrow_message(&issue.message, state.value.as_ref());
                if !messages.contains(&message) {
                    messages.push(message);
                }
            }

            state.valid = messages.is_empty();
            state.message = if messages.is_empty() {
                None
            } else {
                Some(messages.join(MESSAGE_SEPARATOR))
            };
        }

        self.validated = true;
    }

    pub fn arg(&self, key: &str) -> Option<&ArgState> {
        self.args.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgState)> {
        self.args.iter()
    }

    /// True iff results have been applied and every argument is valid
    pub fn ready_to_run(&self) -> bool {
        self.validated && self.args.values().all(|state| state.valid)
    }

    /// Keys that currently block a run, in key order
    pub fn invalid_keys(&self) -> Vec<String> {
        self.args
            .iter()
            .filter(|(_, state)| !state.valid)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Whether this state was computed for exactly these argument values
    pub fn matches_args(&self, args: &ArgsValues) -> bool {
        let known_match = args
            .iter()
            .all(|(key, value)| self.args.get(key).and_then(|s| s.value.as_ref()) == Some(value));
        let no_extra = self
            .args
            .iter()
            .filter(|(_, state)| state.value.is_some())
            .all(|(key, _)| args.contains_key(key));
        known_match && no_extra
    }
}

/// Builds a fresh state for `args` and applies `issues` to it
pub fn aggregate(args: &ArgsValues, issues: &[ValidationIssue]) -> ValidationState {
    let mut state = ValidationState::new(args);
    state.apply(issues);
    state
}

/// Narrows a message that covers many spatial inputs to one input's part
///
/// The provider repeats one message for every input whose bounding box fails
/// to overlap, listing each as `<path>: [bbox] |`. Only the part naming this
/// argument's own path is kept.
fn narrow_message(message: &str, value: Option<&ArgValue>) -> String {
    if !message.starts_with(BBOX_PATTERN) {
        return message.to_string();
    }
    let Some(path) = value.and_then(ArgValue::as_str).filter(|p| !p.is_empty()) else {
        return message.to_string();
    };
    let needle = format!("{}:", path);
    let Some(tail) = message.rsplit(needle.as_str()).next().filter(|_| message.contains(&needle))
    else {
        return message.to_string();
    };

    let bbox = tail.split('|').next().unwrap_or("");
    let formatted: String = bbox
        .split(' ')
        .map(|part| format!("{:<22}", part))
        .collect();
    format!("{}\n{}", BBOX_PREFIX, formatted.trim())
}
