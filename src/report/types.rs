use crate::check::FileOutcome;
use crate::pr::CheckStatus;

/// Summary of one run, ready to be printed or written out.
#[derive(Debug)]
pub struct Report {
    /// PR number
    pub pr_number: u64,
    /// PR title
    pub pr_title: String,
    /// Commit that was checked
    pub commit_sha: String,
    /// Changed files in the commit, checked or not
    pub files_changed: usize,
    /// Outcome of every checked file, in commit order
    pub files: Vec<FileOutcome>,
    /// Review comments posted
    pub comments_posted: usize,
    /// Files that couldn't be checked plus comments that couldn't be posted
    pub failures: usize,
    /// Overall verdict, as reported to the commit status
    pub status: CheckStatus,
}

impl Report {
    /// Short form of the commit SHA for display.
    pub fn short_sha(&self) -> &str {
        self.commit_sha.get(..7).unwrap_or(&self.commit_sha)
    }
}
