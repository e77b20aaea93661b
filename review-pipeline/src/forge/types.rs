//! Forge response shapes (subset of fields we actually use).

use serde::Deserialize;

/// Commit anchors of a merge request diff.
#[derive(Debug, Clone, Deserialize)]
pub struct DiffRefs {
    pub base_sha: String,
    pub head_sha: String,
    /// Absent on forges that have not computed it yet; inline positions then
    /// fail forge-side and are swallowed by the posting policy.
    #[serde(default)]
    pub start_sha: Option<String>,
}

/// Merge-request metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestDetails {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
    /// Not yet present right after MR creation.
    #[serde(default)]
    pub diff_refs: Option<DiffRefs>,
}

/// One file of a compare-commits response.
#[derive(Debug, Clone, Deserialize)]
pub struct FileDiff {
    pub old_path: String,
    pub new_path: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    /// Unified diff text; `None` for binary or oversized files.
    #[serde(default)]
    pub diff: Option<String>,
}

/// Compare-commits envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct CompareResponse {
    #[serde(default)]
    pub diffs: Vec<FileDiff>,
}

/// Repository file envelope; `content` is base64.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryFile {
    pub content: String,
}
