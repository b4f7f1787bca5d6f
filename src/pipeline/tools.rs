//! External tool invocation.
//!
//! Every DjVuLibre, OCR and PDF helper is run through [`ToolRunner`], which
//! resolves the executable (inside `bin_dir` when configured, else on
//! `PATH`), captures stdout and stderr, and enforces a per-call timeout. A
//! timed-out child is killed when its future is dropped (`kill_on_drop`).

use crate::config::ConversionConfig;
use crate::error::ToolError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Bytes of stderr kept in [`ToolError::Failed`].
const STDERR_LIMIT: usize = 2048;

#[derive(Debug, Clone)]
pub struct ToolRunner {
    bin_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(bin_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self { bin_dir, timeout }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(
            config.bin_dir.clone(),
            Duration::from_secs(config.tool_timeout_secs),
        )
    }

    /// Path or bare name handed to the OS for `tool`.
    pub fn program(&self, tool: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        }
    }

    /// Run `tool` with `args` and return its stdout.
    ///
    /// A non-zero exit status is an error carrying the (truncated) stderr.
    pub async fn run<I, S>(&self, tool: &str, args: I) -> Result<Vec<u8>, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_in(tool, args, None).await
    }

    /// Like [`ToolRunner::run`], with `cwd` as the working directory.
    pub async fn run_in<I, S>(
        &self,
        tool: &str,
        args: I,
        cwd: Option<&Path>,
    ) -> Result<Vec<u8>, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(self.program(tool));
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(tool, command = ?cmd.as_std(), "running tool");

        let child = cmd.spawn().map_err(|source| ToolError::NotFound {
            tool: tool.to_string(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Io {
                tool: tool.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool: tool.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: truncate_stderr(&output.stderr),
            });
        }
        Ok(output.stdout)
    }

    /// Run `tool` and decode its stdout as UTF-8 (lossy).
    pub async fn run_text<I, S>(&self, tool: &str, args: I) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let stdout = self.run(tool, args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn truncate_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_LIMIT {
        return text.to_string();
    }
    let mut end = STDERR_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(timeout: Duration) -> ToolRunner {
        ToolRunner::new(None, timeout)
    }

    #[test]
    fn program_resolves_inside_bin_dir() {
        let r = ToolRunner::new(Some(PathBuf::from("/opt/djvulibre/bin")), Duration::from_secs(1));
        assert_eq!(r.program("ddjvu"), PathBuf::from("/opt/djvulibre/bin/ddjvu"));
        assert_eq!(runner(Duration::from_secs(1)).program("ddjvu"), PathBuf::from("ddjvu"));
    }

    #[tokio::test]
    async fn missing_tool_is_not_found() {
        let err = runner(Duration::from_secs(5))
            .run("djvu2pdf-no-such-tool", ["-h"])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout() {
        let out = runner(Duration::from_secs(5))
            .run_text("sh", ["-c", "printf hello"])
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let err = runner(Duration::from_secs(5))
            .run("sh", ["-c", "echo broken >&2; exit 3"])
            .await
            .unwrap_err();
        match err {
            ToolError::Failed { tool, stderr, .. } => {
                assert_eq!(tool, "sh");
                assert_eq!(stderr, "broken");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let err = runner(Duration::from_millis(100))
            .run("sh", ["-c", "sleep 5"])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }), "got {err:?}");
    }

    #[test]
    fn long_stderr_is_truncated() {
        let long = "é".repeat(STDERR_LIMIT);
        let t = truncate_stderr(long.as_bytes());
        assert!(t.len() <= STDERR_LIMIT + '…'.len_utf8());
        assert!(t.ends_with('…'));
    }
}
