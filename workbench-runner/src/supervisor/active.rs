//! Runs in progress
//!
//! "Already running" is a fact about live processes, so it is tracked here
//! rather than read from a job's status, which may have been loaded from a
//! history written by a launcher that has since gone away.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use workbench_core::domain::job::WorkspaceHash;

/// Workspaces that have a run in progress under one supervisor
#[derive(Debug, Default)]
pub(crate) struct ActiveRuns {
    workspaces: Mutex<HashSet<WorkspaceHash>>,
}

impl ActiveRuns {
    /// Claims `hash` for a new run
    ///
    /// # Returns
    /// `None` if a run already holds the workspace
    pub(crate) fn claim(self: &Arc<Self>, hash: WorkspaceHash) -> Option<ActiveRun> {
        let mut workspaces = self.workspaces.lock().unwrap();
        if !workspaces.insert(hash.clone()) {
            return None;
        }
        Some(ActiveRun {
            registry: Arc::clone(self),
            hash,
        })
    }

    pub(crate) fn contains(&self, hash: &WorkspaceHash) -> bool {
        self.workspaces.lock().unwrap().contains(hash)
    }
}

/// A claimed workspace, released when dropped
#[derive(Debug)]
pub(crate) struct ActiveRun {
    registry: Arc<ActiveRuns>,
    hash: WorkspaceHash,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if let Ok(mut workspaces) = self.registry.workspaces.lock() {
            workspaces.remove(&self.hash);
        }
    }
}
