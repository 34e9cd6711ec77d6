//! ID resolver module
//!
//! Resolves a workspace-hash prefix to one history entry, so that users can
//! type a short, unambiguous prefix instead of the full hash.

use anyhow::{Result, anyhow};
use workbench_runner::HistoryEntry;

/// Resolve a workspace hash or prefix to a history entry
///
/// # Arguments
/// * `entries` - The loaded history
/// * `prefix` - A full hash or a prefix of one
///
/// # Errors
/// Returns an error if:
/// - No entry matches the prefix
/// - Multiple entries match the prefix (ambiguous)
pub fn resolve_history_entry<'a>(entries: &'a [HistoryEntry], prefix: &str) -> Result<&'a HistoryEntry> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return Err(anyhow!("A job hash prefix is required"));
    }

    let matches: Vec<_> = entries
        .iter()
        .filter(|e| e.workspace_hash.as_str().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => Err(anyhow!("No job found with hash starting with '{}'", prefix)),
        1 => Ok(matches[0]),
        _ => {
            let hashes: Vec<String> = matches
                .iter()
                .map(|e| short_hash(e.workspace_hash.as_str()).to_string())
                .collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                prefix,
                hashes.join(", ")
            ))
        }
    }
}

/// The leading characters of a hash shown in listings
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
