use serde::{Deserialize, Serialize};

/// Pull request metadata needed to run a check.
#[derive(Debug, Clone)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// PR title
    pub title: String,
    /// SHA of the head commit; the default commit to check
    pub head_sha: String,
}

/// A commit and the files it touches, in the order the host reports them.
#[derive(Debug, Clone)]
pub struct Commit {
    pub sha: String,
    pub files: Vec<ChangedFile>,
}

/// A single file touched by a commit.
/// Deserialized straight from the `files` array of the GitHub commit API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the repository root (e.g., "app/views.py")
    pub filename: String,
    /// URL of the file's raw content at this commit
    #[serde(default)]
    pub raw_url: String,
    /// "added", "modified", "removed", "renamed", ...
    #[serde(default)]
    pub status: String,
}

impl ChangedFile {
    pub fn is_removed(&self) -> bool {
        self.status == "removed"
    }

    /// Whether the path ends in one of `extensions` (given without the dot).
    pub fn has_extension(&self, extensions: &[String]) -> bool {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e == ext))
    }
}

/// A review comment anchored at a diff position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub body: String,
    #[serde(rename = "commit_id")]
    pub commit_sha: String,
    pub path: String,
    pub position: usize,
}

/// State of the commit status reported for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Success,
    Failure,
    Error,
}

impl CheckStatus {
    /// Context label the status is posted under.
    pub const CONTEXT: &'static str = "PyCodeStyle";

    pub fn description(self) -> &'static str {
        match self {
            CheckStatus::Pending => "Checking Python code style...",
            CheckStatus::Success => "Code meets Python style standards!",
            CheckStatus::Failure => "Found some Python code style problems.",
            CheckStatus::Error => "Error while checking Python code style.",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Pending => write!(f, "PENDING"),
            CheckStatus::Success => write!(f, "SUCCESS"),
            CheckStatus::Failure => write!(f, "FAILURE"),
            CheckStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Represents the parsed components of a GitHub PR URL.
#[derive(Debug, Clone)]
pub struct PrUrl {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}
