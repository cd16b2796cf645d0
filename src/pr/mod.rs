pub mod diff;
pub mod types;

pub use types::{ChangedFile, CheckStatus, Comment, Commit, PrUrl, PullRequest};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;

const USER_AGENT: &str = "pr-style-review";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub token not found in config or environment")]
    MissingToken,
}

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Comment rejected: {0}")]
    Rejected(String),
}

/// Source of the pull request's full unified diff.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    async fn diff(&self) -> Result<String, PrError>;
}

/// Destination for review comments.
#[async_trait]
pub trait CommentSink: Send + Sync {
    async fn post_comment(&self, comment: &Comment) -> Result<(), CommentError>;
}

/// Parse a GitHub PR URL into its component parts.
/// Expected format: https://{host}/{owner}/{repo}/pull/{number}
///
/// `host` is github.com, or the host of `api_url` for GitHub Enterprise
/// (`https://ghe.example.com/api/v3` accepts `https://ghe.example.com/...`).
pub fn parse_pr_url(url: &str, api_url: &str) -> Result<PrUrl, PrError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| PrError::InvalidUrl(url.to_string()))?;

    let enterprise_host = reqwest::Url::parse(api_url)
        .ok()
        .and_then(|api| api.host_str().map(str::to_string));
    let host_allowed = match parsed.host_str() {
        Some("github.com") => true,
        Some(host) => enterprise_host.as_deref() == Some(host),
        None => false,
    };
    if !host_allowed {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| PrError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(PrError::InvalidUrl(url.to_string()));
    }

    let pr_number = segments[3]
        .parse::<u64>()
        .map_err(|_| PrError::InvalidUrl(url.to_string()))?;

    Ok(PrUrl {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        pr_number,
    })
}

/// GitHub REST client bound to one pull request.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    pr: PrUrl,
}

impl GitHubClient {
    pub fn new(pr: PrUrl, config: &Config) -> Result<Self, PrError> {
        let token = config.github_token().ok_or(PrError::MissingToken)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            token,
            pr,
        })
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.pr.owner, self.pr.repo)
    }

    fn pull_url(&self) -> String {
        format!("{}/pulls/{}", self.repo_url(), self.pr.pr_number)
    }

    fn request(&self, method: reqwest::Method, url: &str, accept: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", accept)
            .bearer_auth(&self.token)
    }

    /// Fetch PR metadata (title and head commit).
    #[instrument(skip(self), fields(owner = %self.pr.owner, repo = %self.pr.repo, pr = self.pr.pr_number))]
    pub async fn pull_request(&self) -> Result<PullRequest, PrError> {
        #[derive(serde::Deserialize)]
        struct Head {
            sha: String,
        }

        #[derive(serde::Deserialize)]
        struct PullResponse {
            number: u64,
            title: String,
            head: Head,
        }

        debug!("fetching PR metadata from GitHub API");
        let metadata = self
            .request(reqwest::Method::GET, &self.pull_url(), JSON_MEDIA_TYPE)
            .send()
            .await?
            .error_for_status()?
            .json::<PullResponse>()
            .await?;
        debug!(title = %metadata.title, head = %metadata.head.sha, "received PR metadata");

        Ok(PullRequest {
            number: metadata.number,
            title: metadata.title,
            head_sha: metadata.head.sha,
        })
    }

    /// Fetch a commit and the ordered list of files it changes.
    #[instrument(skip(self))]
    pub async fn commit(&self, sha: &str) -> Result<Commit, PrError> {
        #[derive(serde::Deserialize)]
        struct CommitResponse {
            sha: String,
            #[serde(default)]
            files: Vec<ChangedFile>,
        }

        let url = format!("{}/commits/{}", self.repo_url(), sha);
        let commit = self
            .request(reqwest::Method::GET, &url, JSON_MEDIA_TYPE)
            .send()
            .await?
            .error_for_status()?
            .json::<CommitResponse>()
            .await?;
        debug!(files = commit.files.len(), "received commit");

        Ok(Commit {
            sha: commit.sha,
            files: commit.files,
        })
    }

    /// Report the run's state as a commit status.
    #[instrument(skip(self, status), fields(status = %status))]
    pub async fn set_status(&self, sha: &str, status: CheckStatus) -> Result<(), PrError> {
        let url = format!("{}/statuses/{}", self.repo_url(), sha);
        let body = serde_json::json!({
            "state": status,
            "description": status.description(),
            "context": CheckStatus::CONTEXT,
        });
        self.request(reqwest::Method::POST, &url, JSON_MEDIA_TYPE)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        debug!("commit status updated");
        Ok(())
    }

    /// Set a commit status, logging instead of failing when GitHub refuses
    /// (e.g. a token without the status scope). Returns whether it was set.
    pub async fn report_status(&self, sha: &str, status: CheckStatus) -> bool {
        match self.set_status(sha, status).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, %status, "failed to report commit status");
                false
            }
        }
    }
}

#[async_trait]
impl DiffProvider for GitHubClient {
    async fn diff(&self) -> Result<String, PrError> {
        debug!("fetching PR diff from GitHub API");
        let diff_text = self
            .request(reqwest::Method::GET, &self.pull_url(), DIFF_MEDIA_TYPE)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(diff_bytes = diff_text.len(), "received PR diff");
        Ok(diff_text)
    }
}

#[async_trait]
impl CommentSink for GitHubClient {
    async fn post_comment(&self, comment: &Comment) -> Result<(), CommentError> {
        let url = format!("{}/comments", self.pull_url());
        let response = self
            .request(reqwest::Method::POST, &url, JSON_MEDIA_TYPE)
            .json(comment)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CommentError::Rejected(format!("{}: {}", status, detail.trim())));
        }
        Ok(())
    }
}

/// Sink that only logs the comments it would have posted.
pub struct DryRunSink;

#[async_trait]
impl CommentSink for DryRunSink {
    async fn post_comment(&self, comment: &Comment) -> Result<(), CommentError> {
        info!(
            path = %comment.path,
            position = comment.position,
            commit = %comment.commit_sha,
            body = %comment.body,
            "dry run: comment not posted"
        );
        Ok(())
    }
}
