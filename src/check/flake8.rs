use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{CheckError, Checker};
use crate::config::CheckerConfig;

/// Runs an external flake8-compatible checker, feeding file content on
/// stdin and reading `file:line:col: CODE description` lines from stdout.
pub struct ProcessChecker {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    ok_exit_codes: Vec<i32>,
}

impl ProcessChecker {
    /// `fallback_dir` is used as working directory when the config doesn't
    /// name one (typically the local checkout).
    pub fn new(config: &CheckerConfig, fallback_dir: Option<PathBuf>) -> Self {
        let mut args = config.args.clone();
        if let Some(config_file) = &config.config_file {
            args.push("--config".to_string());
            args.push(config_file.clone());
        }

        Self {
            program: config.program.clone(),
            args,
            working_dir: config.working_dir.clone().or(fallback_dir),
            timeout: Duration::from_secs(config.timeout_secs),
            ok_exit_codes: config.ok_exit_codes.clone(),
        }
    }

    fn command(&self, filename: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--stdin-display-name")
            .arg(filename)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Checker for ProcessChecker {
    #[instrument(skip(self, content), fields(program = %self.program, bytes = content.len()))]
    async fn check(&self, filename: &str, content: &str) -> Result<String, CheckError> {
        let mut child = self
            .command(filename)
            .spawn()
            .map_err(|e| CheckError::Invocation(format!("failed to start {}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CheckError::Invocation("stdin not captured".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CheckError::Invocation("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| CheckError::Invocation("stderr not captured".to_string()))?;

        let input = content.as_bytes().to_vec();
        let run = async move {
            // All pipes are driven together; writing stdin first can block
            // on a full stdout pipe.
            let write = async move {
                stdin.write_all(&input).await?;
                stdin.shutdown().await
            };
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (written, read_out, read_err, status) = tokio::join!(
                write,
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err),
                child.wait(),
            );
            read_out?;
            read_err?;
            let status = status?;
            // A checker that exits early without reading its input is judged
            // by its exit status, not by the broken pipe.
            if let Err(e) = written {
                debug!(error = %e, "checker closed stdin early");
            }
            Ok::<_, std::io::Error>((status, out, err))
        };

        let (status, out, err) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| CheckError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| CheckError::Invocation(format!("failed to run {}: {}", self.program, e)))?;

        let stderr_text = String::from_utf8_lossy(&err);
        if !stderr_text.trim().is_empty() {
            debug!(stderr = %stderr_text.trim(), "checker diagnostics");
        }

        match status.code() {
            Some(code) if self.ok_exit_codes.contains(&code) => {}
            Some(code) => {
                return Err(CheckError::Invocation(format!(
                    "{} exited with status {}: {}",
                    self.program,
                    code,
                    stderr_text.trim()
                )))
            }
            None => {
                return Err(CheckError::Invocation(format!(
                    "{} was terminated by a signal",
                    self.program
                )))
            }
        }

        String::from_utf8(out)
            .map_err(|_| CheckError::Invocation(format!("{} wrote non UTF-8 output", self.program)))
    }
}
