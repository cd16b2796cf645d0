pub mod types;

pub use types::Report;

use crate::check::{CheckSummary, FileStatus};
use crate::pr::{CheckStatus, Commit, PullRequest};
use colored::{ColoredString, Colorize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Merge the run summary with PR and commit metadata.
pub fn build(pr: &PullRequest, commit: &Commit, summary: CheckSummary) -> Report {
    let comments_posted = summary.comments_posted();
    let failures = summary.failures();
    let status = summary.status();

    Report {
        pr_number: pr.number,
        pr_title: pr.title.clone(),
        commit_sha: commit.sha.clone(),
        files_changed: commit.files.len(),
        files: summary.files,
        comments_posted,
        failures,
        status,
    }
}

/// Print the report to the terminal, or write it as markdown to `output_path`.
#[instrument(skip(report), fields(pr = report.pr_number, status = %report.status))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(report))?;
            Ok(())
        }
    }
}

fn describe(status: &FileStatus) -> String {
    match status {
        FileStatus::Checked {
            violations: 0, ..
        } => "clean".to_string(),
        FileStatus::Checked {
            violations,
            comments,
            undelivered,
        } => {
            let mut text = format!("{} problem(s), {} commented", violations, comments);
            if *undelivered > 0 {
                text.push_str(&format!(", {} comment(s) not posted", undelivered));
            }
            text
        }
        FileStatus::ContentUnavailable(reason) => format!("skipped: {}", reason),
        FileStatus::CheckFailed(reason) => format!("check failed: {}", reason),
    }
}

fn colorize_status(status: CheckStatus) -> ColoredString {
    match status {
        CheckStatus::Success => status.to_string().green().bold(),
        CheckStatus::Failure => status.to_string().yellow().bold(),
        CheckStatus::Error => status.to_string().red().bold(),
        CheckStatus::Pending => status.to_string().normal(),
    }
}

/// PR #42: "Add login view" @ 0123456
/// Files changed: 3 | Checked: 2 | Comments: 4
///
///   • app/views.py: 5 problem(s), 4 commented
///   • app/models.py: clean
///
/// ═══ PyCodeStyle: FAILURE ═══
fn print_terminal_report(report: &Report) {
    println!();
    println!(
        "PR #{}: \"{}\" @ {}",
        report.pr_number,
        report.pr_title,
        report.short_sha()
    );
    println!(
        "Files changed: {} | Checked: {} | Comments: {}",
        report.files_changed,
        report.files.len(),
        report.comments_posted
    );
    if report.failures > 0 {
        println!("{}", format!("Failures: {}", report.failures).red());
    }
    println!();

    if report.files.is_empty() {
        println!("  No Python files changed.");
    }
    for file in &report.files {
        let line = format!("  • {}: {}", file.filename, describe(&file.status));
        match file.status {
            FileStatus::Checked { undelivered: 0, .. } => println!("{}", line),
            _ => println!("{}", line.red()),
        }
    }
    println!();

    println!(
        "═══ {}: {} ═══",
        CheckStatus::CONTEXT,
        colorize_status(report.status)
    );
    println!("{}", report.status.description());
    println!();
}

fn render_markdown(report: &Report) -> String {
    let mut md = String::new();
    md.push_str(&format!(
        "# PR #{}: \"{}\"\n\n",
        report.pr_number, report.pr_title
    ));
    md.push_str(&format!(
        "**Commit:** `{}` | **Files changed:** {} | **Checked:** {} | **Comments:** {}\n\n",
        report.short_sha(),
        report.files_changed,
        report.files.len(),
        report.comments_posted
    ));

    if report.failures > 0 {
        md.push_str(&format!("**Failures:** {}\n\n", report.failures));
    }

    md.push_str("## Files\n\n");
    if report.files.is_empty() {
        md.push_str("No Python files changed.\n\n");
    } else {
        for file in &report.files {
            md.push_str(&format!("- `{}`: {}\n", file.filename, describe(&file.status)));
        }
        md.push('\n');
    }

    md.push_str(&format!(
        "## {}: {}\n\n{}\n",
        CheckStatus::CONTEXT,
        report.status,
        report.status.description()
    ));
    md
}
