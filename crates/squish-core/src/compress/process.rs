//! External encoder processes.
//!
//! A tool run is one child process awaited to completion. stdout is
//! discarded and stderr is collected so a failure can carry its tail.
//! The child is killed if it outlives its time budget.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::error::{Error, Result};

/// Number of stderr lines kept in [`Error::EncoderFailed`].
const STDERR_TAIL_LINES: usize = 6;

/// A fully described invocation of an external tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a command for `program` with the given time budget.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The arguments passed to the program.
    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Short tool name for logs and errors (`ffmpeg`, not `/usr/bin/ffmpeg`).
    #[must_use]
    pub fn tool_name(&self) -> String {
        tool_name(&self.program)
    }

    /// Run the tool and wait for it to exit.
    pub async fn run(self) -> Result<()> {
        let tool = self.tool_name();
        let started = Instant::now();

        tracing::debug!(tool = %tool, args = ?self.args, "Spawning encoder");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::ToolMissing(tool.clone()),
                _ => Error::EncoderFailed {
                    tool: tool.clone(),
                    reason: format!("failed to start: {e}"),
                },
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(tool = %tool, timeout_secs = self.timeout.as_secs(), "Encoder timed out, killed");
                return Err(Error::Timeout {
                    tool,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let elapsed_ms = started.elapsed().as_millis();

        if output.status.success() {
            tracing::debug!(tool = %tool, elapsed_ms, "Encoder finished");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(
            tool = %tool,
            exit_code = ?output.status.code(),
            elapsed_ms,
            "Encoder failed"
        );

        Err(Error::EncoderFailed {
            tool,
            reason: stderr_tail(&stderr, STDERR_TAIL_LINES)
                .unwrap_or_else(|| format!("exited with {}", output.status)),
        })
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map_or_else(|| program.display().to_string(), |s| s.to_string_lossy().into_owned())
}

/// Last `lines` non-empty lines of a tool's stderr.
fn stderr_tail(stderr: &str, lines: usize) -> Option<String> {
    let kept: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if kept.is_empty() {
        return None;
    }

    let start = kept.len().saturating_sub(lines);
    Some(kept[start..].join("\n"))
}
