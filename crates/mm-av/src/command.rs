//! Builder for executing external tool commands with timeout support.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use mm_core::{Error, Result};

/// Default command timeout: 5 minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// Output is buffered in memory in full; there is no streaming back to the
/// caller. No retries happen at this layer.
///
/// # Example
///
/// ```no_run
/// use mm_av::ToolCommand;
///
/// # async fn example() -> mm_core::Result<()> {
/// let output = ToolCommand::new("ffprobe")
///     .args(["-v", "error", "-show_entries", "format=duration"])
///     .arg("/path/to/clip.mp4")
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
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a new command for the given program name or path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            current_dir: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append a path argument.
    pub fn path_arg(&mut self, p: &Path) -> &mut Self {
        self.args.push(p.to_string_lossy().into_owned());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Run the process from the given working directory.
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// The program this command will run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments accumulated so far.
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
    /// - [`Error::InvalidArgument`] if the program name is empty.
    /// - [`Error::CommandNotFound`] if spawning the process fails.
    /// - [`Error::CommandTimeout`] if the process outlives the timeout; the
    ///   child is killed and reaped first.
    /// - [`Error::CommandFailed`] if the process exits with a non-zero status
    ///   (message is stderr, or a generic exit-code message when empty).
    pub async fn execute(&self) -> Result<ToolOutput> {
        if self.program.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("command must be non-empty".into()));
        }

        let program_name = self.program_name();
        tracing::debug!(tool = %program_name, args = ?self.args, "Running external command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::command_not_found(program_name.clone(), e.to_string()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let waited = tokio::time::timeout(self.timeout, async {
            let (out, err, status) =
                tokio::join!(read_pipe(stdout), read_pipe(stderr), child.wait());
            status.map(|status| (status, out, err))
        })
        .await;

        match waited {
            Ok(Ok((status, out, err))) => {
                let output = ToolOutput {
                    status,
                    stdout: String::from_utf8_lossy(&out).to_string(),
                    stderr: String::from_utf8_lossy(&err).to_string(),
                };

                if !status.success() {
                    let trimmed = output.stderr.trim();
                    let message = if trimmed.is_empty() {
                        match status.code() {
                            Some(code) => format!("{program_name} exited with code {code}"),
                            None => format!("{program_name} terminated by signal"),
                        }
                    } else {
                        trimmed.to_string()
                    };
                    return Err(Error::CommandFailed {
                        command: program_name,
                        code: status.code(),
                        message,
                    });
                }

                Ok(output)
            }
            Ok(Err(e)) => Err(Error::Internal(format!(
                "I/O error waiting for {program_name}: {e}"
            ))),
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(tool = %program_name, error = %e, "Failed to kill timed-out process");
                }
                Err(Error::CommandTimeout {
                    command: program_name,
                    args: self.args.join(" "),
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Drain a child pipe into memory. A missing pipe or read error yields
/// whatever was read so far.
async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}
