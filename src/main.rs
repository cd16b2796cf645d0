mod check;
mod config;
mod content;
mod pr;
mod report;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use check::flake8::ProcessChecker;
use content::{ContentSource, LocalDirectory, RemoteUrl};
use pr::{CheckStatus, CommentSink, DryRunSink, GitHubClient};

/// PR Style Review: runs a Python style checker over the files changed in
/// a GitHub Pull Request and comments on the changed lines with problems.
#[derive(Parser, Debug)]
#[command(name = "pr-style-review", version, about)]
struct Cli {
    /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42);
    /// enterprise links are accepted when they match `github.api_url`
    pr_url: String,

    /// Commit to check; defaults to the PR's head commit
    #[arg(long)]
    commit: Option<String>,

    /// Read file content from this local checkout instead of downloading it
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Config file (defaults to .pr-style-review.toml in the current directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional output file path for a markdown report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log the comments instead of posting them (implies --no-status)
    #[arg(long)]
    dry_run: bool,

    /// Don't report the result as a commit status
    #[arg(long)]
    no_status: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let _main_span = info_span!("pr_style_review", pr_url = %cli.pr_url).entered();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;

    info!("parsing PR URL");
    let parsed_url = pr::parse_pr_url(&cli.pr_url, &config.github.api_url)?;
    debug!(owner = %parsed_url.owner, repo = %parsed_url.repo, pr = parsed_url.pr_number, "parsed PR URL");

    let github = GitHubClient::new(parsed_url, &config)?;

    info!("fetching pull request from GitHub");
    let pull_request = github.pull_request().await?;
    let sha = cli.commit.clone().unwrap_or_else(|| pull_request.head_sha.clone());
    let commit = github.commit(&sha).await?;
    info!(commit = %commit.sha, files = commit.files.len(), "fetched commit");

    let post_status = !(cli.dry_run || cli.no_status);
    if post_status {
        github.report_status(&commit.sha, CheckStatus::Pending).await;
    }

    let content: Box<dyn ContentSource> = match &cli.directory {
        Some(dir) => {
            info!(directory = %dir.display(), "reading files from local checkout");
            Box::new(LocalDirectory::new(dir))
        }
        None => Box::new(RemoteUrl::new(config.github_token())),
    };
    let checker = ProcessChecker::new(&config.checker, cli.directory.clone());
    let sink: &dyn CommentSink = if cli.dry_run { &DryRunSink } else { &github };
    let orchestrator = check::Orchestrator::new(&checker, sink, &config.checker);

    info!("running style check");
    let summary = match orchestrator.run(&github, &commit, content.as_ref()).await {
        Ok(summary) => summary,
        Err(e) => {
            if post_status {
                github.report_status(&commit.sha, CheckStatus::Error).await;
            }
            return Err(e.into());
        }
    };

    let built_report = report::build(&pull_request, &commit, summary);
    report::output(&built_report, cli.output.as_deref())?;
    if post_status {
        github.report_status(&commit.sha, built_report.status).await;
    }
    info!(status = %built_report.status, comments = built_report.comments_posted, "done");

    Ok(match built_report.status {
        CheckStatus::Success | CheckStatus::Pending => ExitCode::SUCCESS,
        CheckStatus::Failure => ExitCode::from(1),
        CheckStatus::Error => ExitCode::from(2),
    })
}
