//! Line-oriented subprocess search.
//!
//! [`run_find_line`] spawns a command and feeds each line of its stdout to a
//! matcher, resolving with the first value the matcher accepts. The child is
//! killed as soon as a match is found; nobody waits for the rest of its output.

use std::convert::Infallible;
use std::ffi::OsStr;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

/// Stderr kept for error messages; the remainder is drained and discarded.
const MAX_STDERR_BYTES: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory for the child. Inherits ours when `None`.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Command \"{command}\" exited with code {code}{}", stderr_suffix(stderr))]
    ExitCode {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("Command \"{command}\" exited with signal {signal}")]
    Signal { command: String, signal: i32 },
    #[error("Failed to read output of \"{command}\": {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to interpret output of \"{command}\": {message}")]
    Matcher { command: String, message: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Run `command` and return the first line `matcher` maps to a value.
///
/// Resolves to `Ok(None)` when the command exits successfully without a match.
pub async fn run_find_line<T, S, M>(
    command: &str,
    args: &[S],
    options: &RunOptions,
    mut matcher: M,
) -> Result<Option<T>, RunnerError>
where
    S: AsRef<OsStr>,
    M: FnMut(&str) -> Option<T>,
{
    try_run_find_line(command, args, options, |line| {
        Ok::<_, Infallible>(matcher(line))
    })
    .await
}

/// Like [`run_find_line`], but the matcher may fail.
///
/// A matcher error stops the search immediately and kills the child.
pub async fn try_run_find_line<T, E, S, M>(
    command: &str,
    args: &[S],
    options: &RunOptions,
    mut matcher: M,
) -> Result<Option<T>, RunnerError>
where
    E: Display,
    S: AsRef<OsStr>,
    M: FnMut(&str) -> Result<Option<T>, E>,
{
    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
        command: command.to_string(),
        source,
    })?;

    let Some(stdout) = child.stdout.take() else {
        return Err(RunnerError::Io {
            command: command.to_string(),
            source: io::Error::other("no stdout from child"),
        });
    };
    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_bounded(stderr)));

    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(source) => {
                abandon(&mut child);
                return Err(RunnerError::Io {
                    command: command.to_string(),
                    source,
                });
            }
        };

        match matcher(&line) {
            Ok(Some(value)) => {
                abandon(&mut child);
                return Ok(Some(value));
            }
            Ok(None) => {}
            Err(e) => {
                abandon(&mut child);
                return Err(RunnerError::Matcher {
                    command: command.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    let status = child.wait().await.map_err(|source| RunnerError::Io {
        command: command.to_string(),
        source,
    })?;
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    check_status(command, status, stderr)?;
    Ok(None)
}

fn abandon(child: &mut Child) {
    // kill_on_drop reaps it; this just stops the output early.
    let _ = child.start_kill();
}

fn check_status(command: &str, status: ExitStatus, stderr: String) -> Result<(), RunnerError> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(RunnerError::ExitCode {
            command: command.to_string(),
            code,
            stderr,
        });
    }
    Err(RunnerError::Signal {
        command: command.to_string(),
        signal: exit_signal(status),
    })
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or_default()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> i32 {
    0
}

async fn read_bounded<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_STDERR_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).trim().to_string()
}
