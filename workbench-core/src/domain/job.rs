//! Job domain types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::datastack::LoadedDatastack;
use crate::domain::args::{ArgValue, ArgsValues, RESULTS_SUFFIX_KEY, WORKSPACE_DIR_KEY};

/// One user-initiated configuration and execution of an external model
///
/// Owned by the session that created it. The history store keeps its own
/// serialized copies, so loading from the store never aliases an open job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Which external model this job runs (stable key, not displayed)
    pub model_run_name: String,

    /// Display name; absent for records written by older versions
    #[serde(default)]
    pub model_human_name: Option<String>,

    /// Output directory and suffix; together they form the job identity
    #[serde(default)]
    pub workspace: Workspace,

    /// Argument values handed to the model, opaque beyond pass-through
    #[serde(default)]
    pub args_values: ArgsValues,

    #[serde(default)]
    pub status: JobStatus,

    /// The model's own log file, once discovered
    #[serde(default)]
    pub logfile: Option<PathBuf>,

    /// Per-session token correlating an open view to this job; never persisted
    #[serde(skip)]
    pub nav_id: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub human_time: Option<String>,
}

/// Job execution status
///
/// `Unrun -> Running -> {Success, Error}`; a finished job may run again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Unrun,
    Running,
    Success,
    Error,
}

impl JobStatus {
    /// Interprets a process exit code
    ///
    /// Only an exit code of exactly zero is a success. A missing code (the
    /// process was killed by a signal) and every nonzero code are errors.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => JobStatus::Success,
            _ => JobStatus::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Unrun => write!(f, "unrun"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// The output location of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub suffix: Option<String>,
}

impl Workspace {
    pub fn new(directory: impl Into<PathBuf>, suffix: Option<String>) -> Self {
        Self {
            directory: Some(directory.into()),
            suffix: suffix.filter(|s| !s.is_empty()),
        }
    }

    /// Computes the identity of a job writing to this workspace
    ///
    /// Returns `None` when no directory is set, since such a job has no
    /// identity and cannot be kept in history.
    pub fn hash(&self) -> Option<WorkspaceHash> {
        let directory = self.directory.as_ref()?;
        let mut hasher = Sha256::new();
        hasher.update(directory.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.suffix.as_deref().unwrap_or("").as_bytes());
        Some(WorkspaceHash(format!("{:x}", hasher.finalize())))
    }
}

/// Content-derived job identity, computed from a [`Workspace`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceHash(String);

impl WorkspaceHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl JobRecord {
    /// Creates an unrun job with no arguments
    pub fn new(model_run_name: impl Into<String>, model_human_name: Option<String>) -> Self {
        Self {
            model_run_name: model_run_name.into(),
            model_human_name,
            workspace: Workspace::default(),
            args_values: ArgsValues::new(),
            status: JobStatus::Unrun,
            logfile: None,
            nav_id: None,
            description: None,
            human_time: None,
        }
    }

    /// Creates an unrun job from a parsed parameter file
    pub fn from_datastack(datastack: LoadedDatastack) -> Self {
        Self::new(datastack.model_run_name, datastack.model_human_name)
            .with_args(datastack.args)
    }

    /// Replaces all argument values and refreshes the workspace identity
    pub fn with_args(mut self, args: ArgsValues) -> Self {
        self.args_values = args;
        self.refresh_workspace();
        self
    }

    /// Sets one argument value, refreshing the identity if it changed
    pub fn set_arg(&mut self, key: impl Into<String>, value: ArgValue) {
        let key = key.into();
        let affects_identity = key == WORKSPACE_DIR_KEY || key == RESULTS_SUFFIX_KEY;
        self.args_values.insert(key, value);
        if affects_identity {
            self.refresh_workspace();
        }
    }

    /// Re-derives `workspace` from the `workspace_dir` and `results_suffix` args
    pub fn refresh_workspace(&mut self) {
        let directory = self
            .args_values
            .get(WORKSPACE_DIR_KEY)
            .and_then(ArgValue::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let suffix = self
            .args_values
            .get(RESULTS_SUFFIX_KEY)
            .map(|v| v.to_string())
            .filter(|s| !s.is_empty());

        self.workspace = Workspace { directory, suffix };
    }

    /// Rewrites `workspace_dir` as an absolute path relative to `base`
    ///
    /// Two spellings of one directory must not produce two identities.
    pub fn absolutize_workspace(&mut self, base: &Path) {
        let Some(directory) = self.workspace.directory.clone() else {
            return;
        };
        let absolute = if directory.is_absolute() {
            directory
        } else {
            base.join(directory)
        };
        let normalized = normalize(&absolute);
        self.set_arg(
            WORKSPACE_DIR_KEY,
            ArgValue::String(normalized.to_string_lossy().into_owned()),
        );
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_hash(&self) -> Option<WorkspaceHash> {
        self.workspace.hash()
    }

    /// Assigns a fresh random navigation token and returns it
    pub fn assign_nav_id(&mut self) -> &str {
        self.nav_id
            .insert(uuid::Uuid::new_v4().simple().to_string())
            .as_str()
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// Name to show to a person, falling back to the run name
    pub fn display_name(&self) -> &str {
        self.model_human_name
            .as_deref()
            .unwrap_or(&self.model_run_name)
    }
}

/// Lexically removes `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_workspace(dir: &str) -> JobRecord {
        let mut args = ArgsValues::new();
        args.insert(WORKSPACE_DIR_KEY.to_string(), ArgValue::from(dir));
        JobRecord::new("carbon", Some("Carbon Storage".to_string())).with_args(args)
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(JobStatus::from_exit_code(Some(0)), JobStatus::Success);
        assert_eq!(JobStatus::from_exit_code(Some(1)), JobStatus::Error);
        assert_eq!(JobStatus::from_exit_code(Some(255)), JobStatus::Error);
        assert_eq!(JobStatus::from_exit_code(Some(-1)), JobStatus::Error);
        assert_eq!(JobStatus::from_exit_code(None), JobStatus::Error);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Running).unwrap(),
            "\"running\""
        );
        let status: JobStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(status, JobStatus::Success);
    }

    #[test]
    fn test_workspace_follows_args() {
        let mut job = job_with_workspace("/tmp/ws1");
        assert_eq!(job.workspace.directory, Some(PathBuf::from("/tmp/ws1")));
        assert_eq!(job.workspace.suffix, None);

        job.set_arg(RESULTS_SUFFIX_KEY, ArgValue::from("v2"));
        assert_eq!(job.workspace.suffix.as_deref(), Some("v2"));

        job.set_arg(RESULTS_SUFFIX_KEY, ArgValue::from(""));
        assert_eq!(job.workspace.suffix, None);
    }

    #[test]
    fn test_hash_depends_on_directory_and_suffix() {
        let a = Workspace::new("/tmp/ws1", None).hash().unwrap();
        let b = Workspace::new("/tmp/ws1", None).hash().unwrap();
        let c = Workspace::new("/tmp/ws2", None).hash().unwrap();
        let d = Workspace::new("/tmp/ws1", Some("x".into())).hash().unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_no_directory_no_identity() {
        let job = JobRecord::new("carbon", None);
        assert!(job.workspace_hash().is_none());
        assert_eq!(job.display_name(), "carbon");
    }

    #[test]
    fn test_absolutize_workspace() {
        let mut job = job_with_workspace("out/../ws1");
        job.absolutize_workspace(Path::new("/home/user"));

        assert_eq!(
            job.args_values[WORKSPACE_DIR_KEY],
            ArgValue::from("/home/user/ws1")
        );
        assert_eq!(
            job.workspace_hash(),
            Workspace::new("/home/user/ws1", None).hash()
        );
    }

    #[test]
    fn test_nav_id_is_not_persisted() {
        let mut job = job_with_workspace("/tmp/ws1");
        let nav_id = job.assign_nav_id().to_string();
        assert_eq!(nav_id.len(), 32);

        let json = serde_json::to_value(&job).unwrap();
        assert!(json.get("nav_id").is_none());

        let restored: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(restored.nav_id, None);
        assert_eq!(restored.workspace, job.workspace);
    }

    #[test]
    fn test_legacy_record_without_optional_fields() {
        let json = serde_json::json!({
            "model_run_name": "carbon",
            "workspace": { "directory": "/tmp/ws1" },
            "status": "success",
            "unknown_field": 7,
        });
        let job: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(job.model_human_name, None);
        assert_eq!(job.status, JobStatus::Success);
        assert!(job.args_values.is_empty());
    }
}
