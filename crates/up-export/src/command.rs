//! Builder for running external tools, either to completion with captured
//! output or streaming stderr line by line under a cancellation token.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use up_core::{Error, Result};

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Number of trailing stderr lines kept for error messages when streaming.
const STDERR_TAIL_LINES: usize = 20;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// How a streamed run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// The process exited successfully.
    Finished(ExitStatus),
    /// The cancellation token fired and the process was killed.
    Cancelled,
}

/// A builder for constructing and executing external tool invocations.
///
/// ```no_run
/// use up_export::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> up_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "quiet", "-print_format", "json", "-show_format"])
///     .arg("/path/to/recording.mov")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tool`] if spawning fails, the process times out, or
    /// it exits with a non-zero status (message includes stderr).
    pub async fn execute(&self) -> Result<ToolOutput> {
        let name = self.program_name();

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(&name, format!("failed to spawn: {e}")))?;

        // On timeout the future (and with it the child) is dropped, which
        // kills the process.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::tool(name, format!("I/O error waiting for process: {e}")))
            }
            Err(_elapsed) => {
                return Err(Error::tool(name, format!("timed out after {:?}", self.timeout)))
            }
        };

        let tool_output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(Error::tool(
                name,
                format!(
                    "exited with status {}: {}",
                    output.status,
                    tool_output.stderr.trim()
                ),
            ));
        }

        Ok(tool_output)
    }

    /// Execute the command, handing each stderr line to `on_line` as it
    /// arrives. Stdout is discarded.
    ///
    /// When `cancel` fires the child is killed and `StreamExit::Cancelled` is
    /// returned. A non-zero exit is an [`Error::Tool`] carrying the last
    /// stderr lines.
    pub async fn execute_with_stderr_callback(
        &self,
        mut on_line: impl FnMut(&str),
        cancel: Option<CancellationToken>,
    ) -> Result<StreamExit> {
        let name = self.program_name();
        let cancel = cancel.unwrap_or_default();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(&name, format!("failed to spawn: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::tool(&name, "stderr was not captured"))?;
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    tracing::debug!("{name} killed on cancellation");
                    return Ok(StreamExit::Cancelled);
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(Error::tool(name, format!("timed out after {:?}", self.timeout)));
                }
                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => break,
                    Ok(_) => {
                        // ffmpeg echoes tags and file names verbatim; those need not be UTF-8.
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(['\n', '\r'])
                            .to_string();
                        buf.clear();
                        on_line(&line);
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Err(e) => {
                        let _ = child.kill().await;
                        return Err(Error::tool(name, format!("I/O error reading stderr: {e}")));
                    }
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Ok(StreamExit::Cancelled);
            }
            status = child.wait() => status
                .map_err(|e| Error::tool(&name, format!("I/O error waiting for process: {e}")))?,
        };

        if !status.success() {
            let tail: Vec<String> = tail.into_iter().collect();
            return Err(Error::tool(
                name,
                format!("exited with status {status}: {}", tail.join("\n").trim()),
            ));
        }

        Ok(StreamExit::Finished(status))
    }
}
