use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::pr::ChangedFile;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Content of {0} is not valid UTF-8")]
    Decode(String),
}

/// Where the current content of a changed file comes from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, file: &ChangedFile) -> Result<String, ContentError>;
}

/// Reads files from a local checkout of the PR's head.
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContentSource for LocalDirectory {
    async fn fetch(&self, file: &ChangedFile) -> Result<String, ContentError> {
        let path = self.root.join(&file.filename);
        debug!(path = %path.display(), "reading local file");
        let bytes = tokio::fs::read(&path).await.map_err(|source| ContentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        String::from_utf8(bytes).map_err(|_| ContentError::Decode(file.filename.clone()))
    }
}

/// Downloads each file from its raw-content URL.
pub struct RemoteUrl {
    client: reqwest::Client,
    token: Option<String>,
}

impl RemoteUrl {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl ContentSource for RemoteUrl {
    async fn fetch(&self, file: &ChangedFile) -> Result<String, ContentError> {
        let url = &file.raw_url;
        debug!(url = %url, "downloading file");
        let download_err = |source| ContentError::Download {
            url: url.clone(),
            source,
        };

        let mut request = self.client.get(url).header("User-Agent", "pr-style-review");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let bytes = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(download_err)?
            .bytes()
            .await
            .map_err(download_err)?;

        String::from_utf8(bytes.to_vec()).map_err(|_| ContentError::Decode(file.filename.clone()))
    }
}
