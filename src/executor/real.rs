//! Real command executor implementation.
//!
//! This module provides [`RealCommandExecutor`], which runs commands using
//! `std::process::Command`, captures their output on reader threads and
//! enforces the per-command time limit.
//!
//! Every command is started as the leader of its own process group so a
//! timeout can take down the whole tree it forked (`curl | bash`, package
//! managers, `sudo -- bash -c ...`), not just the direct child.

use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rustix::process::{Pid, Signal, kill_process_group};
use which::which;

use super::pipe::{StreamType, capture_pipe, panic_message};
use super::{CommandExecutor, CommandResult, CommandSpec};
use crate::error::ProvisionError;

/// How often a running child is polled for exit while waiting on the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time a process group gets to exit after SIGTERM before it is sent SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for reader threads after a kill before leaving them detached.
const DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// Sends `signal` to the process group led by `child`.
fn signal_group(child: &Child, signal: Signal) {
    let pid = Pid::from_child(child);
    if let Err(e) = kill_process_group(pid, signal) {
        // ESRCH once the group is gone; EPERM for members running as root under sudo.
        tracing::debug!(pid = child.id(), "signal to process group failed: {}", e);
    }
}

/// Polls `child` until it exits or `limit` elapses.
fn wait_at_most(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            _ => return None,
        }
    }
}

/// Terminates a child's process group and collects its reader threads.
///
/// The group gets SIGTERM first, which `sudo` relays to the command it runs,
/// then SIGKILL after [`TERM_GRACE`]. Reader threads are joined only while
/// they finish within [`DRAIN_LIMIT`]: a descendant that escaped the group
/// may still hold the pipes open, and the caller must not block on it.
/// Called from error paths in [`RealCommandExecutor::execute()`].
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<String>>,
{
    let pid = child.id();
    signal_group(child, Signal::TERM);
    if wait_at_most(child, TERM_GRACE).is_none() {
        if let Err(e) = child.kill() {
            tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
        }
    }
    signal_group(child, Signal::KILL);
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }

    let deadline = Instant::now() + DRAIN_LIMIT;
    for handle in handles {
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
        if !handle.is_finished() {
            tracing::warn!(pid = pid, "output pipe still held open after kill; detaching reader thread");
            continue;
        }
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

fn spawn_reader<R>(
    name: &str,
    pipe: Option<R>,
    stream_type: StreamType,
) -> std::io::Result<JoinHandle<String>>
where
    R: std::io::Read + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || capture_pipe(pipe, stream_type))
}

/// Command executor that runs actual system commands.
///
/// When `dry_run` is true, commands are logged but not executed, and
/// `execute()` returns a successful result with empty output.
pub struct RealCommandExecutor {
    pub dry_run: bool,
}

impl RealCommandExecutor {
    /// Waits for `child` to exit or for `timeout` to elapse.
    ///
    /// Returns `Ok(None)` on timeout; the caller is responsible for the kill.
    fn wait_with_deadline(
        child: &mut Child,
        timeout: Duration,
    ) -> std::io::Result<Option<ExitStatus>> {
        // A limit too large to represent as an instant is no limit at all.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return child.wait().map(Some);
        };
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandResult, ProvisionError> {
        if self.dry_run {
            tracing::info!("dry run: {}", spec.display());
            return Ok(CommandResult {
                exit_succeeded: true,
                ..CommandResult::default()
            });
        }

        let cmd = which(&spec.command).map_err(|e| ProvisionError::Spawn {
            command: spec.display(),
            message: format!("command not found in PATH: {}", e),
        })?;
        tracing::trace!("command found: {}: {}", spec.command, cmd.to_string_lossy());

        let mut command = Command::new(cmd);
        command.args(&spec.args);

        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        command.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| ProvisionError::Spawn {
            command: spec.display(),
            message: format!("failed to spawn: {}", e),
        })?;

        tracing::trace!("spawned command: {}: pid={}", spec.command, child.id());

        if let (Some(credential), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            // The process may exit before reading; a broken pipe is not an error here.
            if let Err(e) = writeln!(stdin, "{}", credential.expose()) {
                tracing::debug!("failed to write stdin of {}: {}", spec.command, e);
            }
        }

        let stdout_handle = match spawn_reader("stdout-reader", child.stdout.take(), StreamType::Stdout)
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                return Err(ProvisionError::Spawn {
                    command: spec.display(),
                    message: format!("failed to spawn stdout reader thread: {}", e),
                });
            }
        };

        let stderr_handle = match spawn_reader("stderr-reader", child.stderr.take(), StreamType::Stderr)
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle]);
                return Err(ProvisionError::Spawn {
                    command: spec.display(),
                    message: format!("failed to spawn stderr reader thread: {}", e),
                });
            }
        };

        let status = match Self::wait_with_deadline(&mut child, spec.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::warn!(
                    "command exceeded {}s, killing: {}",
                    spec.timeout.as_secs(),
                    spec.display()
                );
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                return Err(ProvisionError::Timeout {
                    command: spec.display(),
                    seconds: spec.timeout.as_secs(),
                });
            }
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                return Err(ProvisionError::Spawn {
                    command: spec.display(),
                    message: format!("failed to wait for command: {}", e),
                });
            }
        };

        let mut panicked_streams = Vec::new();
        let mut outputs = Vec::with_capacity(2);
        for (name, handle) in [("stdout", stdout_handle), ("stderr", stderr_handle)] {
            match handle.join() {
                Ok(text) => outputs.push(text),
                Err(e) => {
                    let msg = panic_message(&*e).to_string();
                    tracing::error!(stream = name, panic = %msg, "reader thread panicked");
                    panicked_streams.push(format!("{}: {}", name, msg));
                    outputs.push(String::new());
                }
            }
        }

        if !panicked_streams.is_empty() {
            return Err(ProvisionError::Spawn {
                command: spec.display(),
                message: format!(
                    "reader thread(s) panicked during command execution: {}",
                    panicked_streams.join(", ")
                ),
            });
        }

        let stderr = outputs.pop().unwrap_or_default();
        let stdout = outputs.pop().unwrap_or_default();

        tracing::trace!("executed command: {}: success={}", spec.command, status.success());

        Ok(CommandResult {
            stdout,
            stderr,
            exit_succeeded: status.success(),
            code: status.code(),
        })
    }
}
