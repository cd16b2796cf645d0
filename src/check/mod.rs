pub mod flake8;
pub mod violation;

pub use violation::Violation;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::CheckerConfig;
use crate::content::ContentSource;
use crate::pr::diff::{self, DiffPositionIndex};
use crate::pr::{ChangedFile, CheckStatus, Comment, CommentSink, Commit, DiffProvider, PrError};

/// Attempts per comment before it is given up on.
const COMMENT_ATTEMPTS: usize = 2;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Failed to fetch PR diff: {0}")]
    Diff(#[from] PrError),

    #[error("Checker invocation failed: {0}")]
    Invocation(String),

    #[error("Checker timed out after {0} seconds")]
    Timeout(u64),

    #[error("Malformed checker output ({reason}): {line}")]
    MalformedOutput { line: String, reason: String },
}

/// A style checker that reports problems for one file's content.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Run the checker over `content`, reported under `filename`, and
    /// return its raw `file:line:col: CODE description` output.
    async fn check(&self, filename: &str, content: &str) -> Result<String, CheckError>;
}

/// What happened to one changed file during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Checked {
        violations: usize,
        comments: usize,
        undelivered: usize,
    },
    ContentUnavailable(String),
    CheckFailed(String),
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub filename: String,
    pub status: FileStatus,
}

/// Aggregate result of a run over one commit.
#[derive(Debug, Clone, Default)]
pub struct CheckSummary {
    pub files: Vec<FileOutcome>,
}

impl CheckSummary {
    pub fn comments_posted(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.status {
                FileStatus::Checked { comments, .. } => comments,
                _ => 0,
            })
            .sum()
    }

    /// True if at least one violation was commented on.
    pub fn problems_found(&self) -> bool {
        self.comments_posted() > 0
    }

    /// Files that couldn't be checked plus comments that couldn't be posted.
    pub fn failures(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.status {
                FileStatus::Checked { undelivered, .. } => undelivered,
                _ => 1,
            })
            .sum()
    }

    /// Commit status for this run. Posted problems win over failures.
    pub fn status(&self) -> CheckStatus {
        if self.problems_found() {
            CheckStatus::Failure
        } else if self.failures() > 0 {
            CheckStatus::Error
        } else {
            CheckStatus::Success
        }
    }
}

/// Checks the changed files of a commit and comments on the violations
/// that fall inside the PR diff.
pub struct Orchestrator<'a> {
    checker: &'a dyn Checker,
    sink: &'a dyn CommentSink,
    extensions: Vec<String>,
    rule_url: String,
}

impl<'a> Orchestrator<'a> {
    pub fn new(checker: &'a dyn Checker, sink: &'a dyn CommentSink, config: &CheckerConfig) -> Self {
        Self {
            checker,
            sink,
            extensions: config.extensions.clone(),
            rule_url: config.rule_url.clone(),
        }
    }

    /// Check every matching file of `commit`, in commit order.
    ///
    /// Only a failure to fetch the PR diff aborts the run; anything that
    /// goes wrong with a single file is recorded in its outcome.
    pub async fn run(
        &self,
        pull_request: &dyn DiffProvider,
        commit: &Commit,
        content: &dyn ContentSource,
    ) -> Result<CheckSummary, CheckError> {
        let diff_text = pull_request.diff().await?;
        let diff_lines = diff::diff_lines(&diff_text);
        debug!(lines = diff_lines.len(), "loaded PR diff");

        let mut summary = CheckSummary::default();
        for file in &commit.files {
            if file.is_removed() || !file.has_extension(&self.extensions) {
                debug!(file = %file.filename, "not checked");
                continue;
            }

            info!(file = %file.filename, "checking");
            let status = self
                .check_file(&diff_lines, commit, file, content)
                .instrument(info_span!("file", path = %file.filename))
                .await;
            summary.files.push(FileOutcome {
                filename: file.filename.clone(),
                status,
            });
        }

        info!(
            files = summary.files.len(),
            comments = summary.comments_posted(),
            failures = summary.failures(),
            "check complete"
        );
        Ok(summary)
    }

    async fn check_file(
        &self,
        diff_lines: &[&str],
        commit: &Commit,
        file: &ChangedFile,
        content: &dyn ContentSource,
    ) -> FileStatus {
        let text = match content.fetch(file).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "content unavailable, skipping file");
                return FileStatus::ContentUnavailable(e.to_string());
            }
        };

        let violations = match self.find_violations(&file.filename, &text).await {
            Ok(violations) => violations,
            Err(e) => {
                error!(error = %e, "check failed");
                return FileStatus::CheckFailed(e.to_string());
            }
        };

        let index = DiffPositionIndex::build(diff_lines, &file.filename);
        if index.is_empty() && !violations.is_empty() {
            debug!("file has no commentable lines in the PR diff");
        }
        debug!(
            violations = violations.len(),
            commentable_lines = index.len(),
            block_len = index.block_len(),
            "resolving positions"
        );

        let mut comments = 0;
        let mut undelivered = 0;
        for violation in &violations {
            let Some(position) = index.position(violation.line) else {
                debug!(line = violation.line, code = %violation.code, "outside the diff");
                continue;
            };

            info!(position, "{}", violation);
            let comment = Comment {
                body: violation.comment_body(&self.rule_url),
                commit_sha: commit.sha.clone(),
                path: violation.filename.clone(),
                position,
            };
            if self.deliver(&comment).await {
                comments += 1;
            } else {
                undelivered += 1;
            }
        }

        FileStatus::Checked {
            violations: violations.len(),
            comments,
            undelivered,
        }
    }

    async fn find_violations(&self, filename: &str, content: &str) -> Result<Vec<Violation>, CheckError> {
        let output = self.checker.check(filename, content).await?;
        violation::parse_output(&output, filename)
    }

    async fn deliver(&self, comment: &Comment) -> bool {
        for attempt in 1..=COMMENT_ATTEMPTS {
            match self.sink.post_comment(comment).await {
                Ok(()) => return true,
                Err(e) => warn!(attempt, position = comment.position, error = %e, "failed to post comment"),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentError;
    use crate::pr::CommentError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SAMPLE_DIFF: &str = include_str!("../../tests/fixtures/sample_diff.patch");

    struct FixedDiff(Option<&'static str>);

    #[async_trait]
    impl DiffProvider for FixedDiff {
        async fn diff(&self) -> Result<String, PrError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| PrError::InvalidUrl("no diff".to_string()))
        }
    }

    /// Serves file content from memory; unknown files are unavailable.
    struct MemoryContent(HashMap<String, String>);

    #[async_trait]
    impl ContentSource for MemoryContent {
        async fn fetch(&self, file: &ChangedFile) -> Result<String, ContentError> {
            self.0.get(&file.filename).cloned().ok_or_else(|| ContentError::Read {
                path: file.filename.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    /// Replays canned checker output per file; unknown files fail to run.
    struct ScriptedChecker {
        outputs: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Checker for ScriptedChecker {
        async fn check(&self, filename: &str, _content: &str) -> Result<String, CheckError> {
            self.calls.lock().unwrap().push(filename.to_string());
            self.outputs
                .get(filename)
                .cloned()
                .ok_or_else(|| CheckError::Invocation(format!("no output for {filename}")))
        }
    }

    /// Records posted comments; the first `failures` posts are rejected.
    #[derive(Default)]
    struct RecordingSink {
        comments: Mutex<Vec<Comment>>,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl CommentSink for RecordingSink {
        async fn post_comment(&self, comment: &Comment) -> Result<(), CommentError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CommentError::Rejected("422 Unprocessable Entity".to_string()));
            }
            self.comments.lock().unwrap().push(comment.clone());
            Ok(())
        }
    }

    fn changed(filename: &str) -> ChangedFile {
        ChangedFile {
            filename: filename.to_string(),
            raw_url: format!("https://example.com/raw/{filename}"),
            status: "modified".to_string(),
        }
    }

    fn commit(files: &[&str]) -> Commit {
        Commit {
            sha: "abc123".to_string(),
            files: files.iter().map(|f| changed(f)).collect(),
        }
    }

    fn content(files: &[&str]) -> MemoryContent {
        MemoryContent(
            files
                .iter()
                .map(|f| (f.to_string(), "x = 1\n".to_string()))
                .collect(),
        )
    }

    fn checker(outputs: &[(&str, &str)]) -> ScriptedChecker {
        ScriptedChecker {
            outputs: outputs
                .iter()
                .map(|(f, o)| (f.to_string(), o.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn config() -> CheckerConfig {
        CheckerConfig {
            rule_url: "https://rules.example/{code}".to_string(),
            ..CheckerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_comments_only_on_lines_in_diff() {
        let checker = checker(&[(
            "app/views.py",
            "app/views.py:2:10: E401 multiple imports on one line\napp/views.py:10:1: E302 expected 2 blank lines\n",
        )]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let summary = orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/views.py", "notes.txt"]),
                &content(&["app/views.py", "notes.txt"]),
            )
            .await
            .unwrap();

        assert!(summary.problems_found());
        assert_eq!(summary.status(), CheckStatus::Failure);
        assert_eq!(*checker.calls.lock().unwrap(), vec!["app/views.py"]);
        assert_eq!(summary.files.len(), 1);
        assert_eq!(
            summary.files[0].status,
            FileStatus::Checked {
                violations: 2,
                comments: 1,
                undelivered: 0
            }
        );

        let comments = sink.comments.lock().unwrap();
        assert_eq!(
            *comments,
            vec![Comment {
                body: "At column 10: [(E401) multiple imports on one line](https://rules.example/E401)".to_string(),
                commit_sha: "abc123".to_string(),
                path: "app/views.py".to_string(),
                position: 4,
            }]
        );
    }

    #[tokio::test]
    async fn test_clean_files_post_nothing() {
        let checker = checker(&[("app/views.py", "\n"), ("app/models.py", "")]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let summary = orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/views.py", "app/models.py"]),
                &content(&["app/views.py", "app/models.py"]),
            )
            .await
            .unwrap();

        assert!(!summary.problems_found());
        assert_eq!(summary.failures(), 0);
        assert_eq!(summary.status(), CheckStatus::Success);
        assert!(sink.comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_output_is_isolated_to_its_file() {
        let checker = checker(&[
            ("app/views.py", "app/views.py:3: E501 line too long\n"),
            ("app/models.py", "app/models.py:3:5: E231 missing whitespace after ':'\n"),
        ]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let summary = orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/views.py", "app/models.py"]),
                &content(&["app/views.py", "app/models.py"]),
            )
            .await
            .unwrap();

        assert!(matches!(summary.files[0].status, FileStatus::CheckFailed(_)));
        assert!(matches!(
            summary.files[1].status,
            FileStatus::Checked { comments: 1, .. }
        ));
        let comments = sink.comments.lock().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].path, "app/models.py");
        assert_eq!(comments[0].position, 4);
        assert!(comments[0].body.contains("missing whitespace after ':'"));
    }

    #[tokio::test]
    async fn test_unavailable_content_is_isolated_to_its_file() {
        let checker = checker(&[("setup.py", "setup.py:2:17: E231 missing whitespace after ','\n")]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let summary = orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/views.py", "setup.py"]),
                &content(&["setup.py"]),
            )
            .await
            .unwrap();

        assert!(matches!(summary.files[0].status, FileStatus::ContentUnavailable(_)));
        assert_eq!(summary.comments_posted(), 1);
        assert_eq!(summary.failures(), 1);
        assert_eq!(summary.status(), CheckStatus::Failure);
    }

    #[tokio::test]
    async fn test_checker_failure_without_problems_is_error() {
        let checker = checker(&[]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let summary = orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/views.py"]),
                &content(&["app/views.py"]),
            )
            .await
            .unwrap();

        assert!(!summary.problems_found());
        assert_eq!(summary.status(), CheckStatus::Error);
    }

    #[tokio::test]
    async fn test_comments_follow_checker_order() {
        let checker = checker(&[(
            "app/views.py",
            "app/views.py:22:5: T201 print found\napp/views.py:1:1: F401 'json' imported but unused\n",
        )]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/views.py"]),
                &content(&["app/views.py"]),
            )
            .await
            .unwrap();

        let positions: Vec<usize> = sink.comments.lock().unwrap().iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![11, 2]);
    }

    #[tokio::test]
    async fn test_comment_is_retried_once() {
        let checker = checker(&[("app/models.py", "app/models.py:1:1: F401 'json' imported but unused\n")]);
        let sink = RecordingSink {
            failures: AtomicUsize::new(1),
            ..RecordingSink::default()
        };
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let summary = orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/models.py"]),
                &content(&["app/models.py"]),
            )
            .await
            .unwrap();

        assert!(summary.problems_found());
        assert_eq!(sink.comments.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_undeliverable_comment_does_not_stop_run() {
        let checker = checker(&[(
            "app/models.py",
            "app/models.py:1:1: F401 'json' imported but unused\napp/models.py:2:1: E302 expected 2 blank lines\n",
        )]);
        let sink = RecordingSink {
            failures: AtomicUsize::new(COMMENT_ATTEMPTS),
            ..RecordingSink::default()
        };
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let summary = orchestrator
            .run(
                &FixedDiff(Some(SAMPLE_DIFF)),
                &commit(&["app/models.py"]),
                &content(&["app/models.py"]),
            )
            .await
            .unwrap();

        assert_eq!(
            summary.files[0].status,
            FileStatus::Checked {
                violations: 2,
                comments: 1,
                undelivered: 1
            }
        );
        assert_eq!(sink.comments.lock().unwrap()[0].position, 3);
    }

    #[tokio::test]
    async fn test_removed_files_are_skipped() {
        let checker = checker(&[]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());
        let mut commit = commit(&["app/legacy.py"]);
        commit.files[0].status = "removed".to_string();

        let summary = orchestrator
            .run(&FixedDiff(Some(SAMPLE_DIFF)), &commit, &content(&[]))
            .await
            .unwrap();

        assert!(summary.files.is_empty());
        assert!(checker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_diff_failure_aborts_run() {
        let checker = checker(&[]);
        let sink = RecordingSink::default();
        let orchestrator = Orchestrator::new(&checker, &sink, &config());

        let result = orchestrator
            .run(&FixedDiff(None), &commit(&["app/views.py"]), &content(&["app/views.py"]))
            .await;

        assert!(matches!(result, Err(CheckError::Diff(_))));
    }
}
