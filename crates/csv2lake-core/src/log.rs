// Commit log
//
// Each table directory holds `_commits/<version>.json` entries. A commit is a
// full snapshot: it lists every active data file, relative to the table root.
// Readers resolve the highest committed version only, which is what makes an
// overwrite atomic from their perspective.

use opendal::Operator;
use serde::{Deserialize, Serialize};

use crate::error::{LakeError, Result};

const COMMIT_DIR: &str = "_commits";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEntry {
    pub version: u64,
    pub operation: CommitOperation,
    /// Active data files, relative to the table root.
    pub files: Vec<String>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOperation {
    Create,
    Append,
    Overwrite,
}

/// Resolve the physical table root for a logical name: `prefix ++ name`.
/// No sanitization happens here; distinct names yield distinct roots.
pub(crate) fn table_root(prefix: &str, table: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/", table)
    } else {
        format!("{}/{}/", prefix, table)
    }
}

fn commit_path(root: &str, version: u64) -> String {
    format!("{}{}/{:020}.json", root, COMMIT_DIR, version)
}

/// Read the latest commit for a table, or None if the table does not exist.
pub(crate) async fn latest_commit(
    op: &Operator,
    root: &str,
    table: &str,
) -> Result<Option<CommitEntry>> {
    let dir = format!("{}{}/", root, COMMIT_DIR);
    let entries = match op.list(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<u64> = None;
    for entry in entries {
        if let Some(stem) = entry.name().strip_suffix(".json") {
            if let Ok(version) = stem.parse::<u64>() {
                latest = Some(latest.map_or(version, |v| v.max(version)));
            }
        }
    }

    let Some(version) = latest else {
        return Ok(None);
    };

    let raw = op.read(&commit_path(root, version)).await?;
    let commit: CommitEntry =
        serde_json::from_slice(&raw.to_bytes()).map_err(|e| LakeError::CommitLog {
            table: table.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Some(commit))
}

/// Persist a commit entry. The data files it references must already be
/// durable before this is called.
pub(crate) async fn write_commit(
    op: &Operator,
    root: &str,
    table: &str,
    commit: &CommitEntry,
) -> Result<()> {
    let payload = serde_json::to_vec(commit).map_err(|e| LakeError::CommitLog {
        table: table.to_string(),
        reason: e.to_string(),
    })?;
    op.write(&commit_path(root, commit.version), payload).await?;
    Ok(())
}
