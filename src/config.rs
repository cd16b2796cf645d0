use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the current directory when `--config` isn't given.
pub const DEFAULT_CONFIG_FILE: &str = ".pr-style-review.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .pr-style-review.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitHub-specific settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// How the style checker is invoked and which files it sees
    #[serde(default)]
    pub checker: CheckerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,

    /// REST API base URL; override for GitHub Enterprise.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Executable to run (e.g. "python3", "flake8")
    pub program: String,
    /// Arguments placed before the per-file arguments
    pub args: Vec<String>,
    /// Checker config file passed with `--config`
    pub config_file: Option<String>,
    /// Working directory of the checker. Defaults to the local checkout
    /// directory when one is given.
    pub working_dir: Option<PathBuf>,
    /// Per-file timeout in seconds
    pub timeout_secs: u64,
    /// Exit codes that mean "ran fine" (flake8 exits 1 when it reports problems)
    pub ok_exit_codes: Vec<i32>,
    /// File extensions to check, without the dot
    pub extensions: Vec<String>,
    /// Rule documentation link; `{code}` is replaced by the violation code
    pub rule_url: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "flake8".to_string()],
            config_file: None,
            working_dir: None,
            timeout_secs: 60,
            ok_exit_codes: vec![0, 1],
            extensions: vec!["py".to_string()],
            rule_url: "https://www.flake8rules.com/rules/{code}.html".to_string(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

impl Config {
    /// Load configuration from `path`, or from .pr-style-review.toml in the
    /// current directory. Returns default config if that file doesn't exist.
    /// A missing github.token is filled from the GITHUB_TOKEN env var.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)?
                } else {
                    Config::default()
                }
            }
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}
