//! Client process supervisor
//!
//! Starts the local tunnel client used by proxied probes, waits until it is
//! ready to accept SOCKS connections, and always tears it down again.
//!
//! Lifecycle: `NotStarted -> Starting -> Ready -> Terminating -> Terminated`,
//! with `Failed` reached from `Starting` when readiness is not observed in
//! time. A failed client is still reaped; its state stays `Failed`.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::models::ClientCommand;

/// Head start given to clients that have no readiness pattern
const NO_PATTERN_HEAD_START: Duration = Duration::from_secs(2);

/// How long a client may take to exit after the termination signal
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound on buffered output scanned for the readiness pattern
const MAX_SCANNED_OUTPUT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    NotStarted,
    Starting,
    Ready,
    Terminating,
    Terminated,
    Failed,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid readiness pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to start client `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("client did not become ready in {0:?}")]
    NotReady(Duration),
    #[error("client closed its output before becoming ready")]
    OutputClosed,
}

/// A supervised client subprocess
pub struct ClientProcess {
    command: ClientCommand,
    state: ClientState,
    child: Option<Child>,
    /// Process group of the shell, kept after the leader is reaped
    pgid: Option<u32>,
    output: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    grace_period: Duration,
}

impl ClientProcess {
    pub fn new(command: &ClientCommand) -> Self {
        Self {
            command: command.clone(),
            state: ClientState::NotStarted,
            child: None,
            pgid: None,
            output: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Override how long termination waits before force-killing
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// OS process id while the child has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Whether a child process is still owned (not yet reaped)
    pub fn is_alive(&self) -> bool {
        self.child.is_some()
    }

    /// Run `work` against a ready client, tearing the client down afterwards
    ///
    /// Teardown happens on every path: readiness failure, normal completion,
    /// and (through `Drop`) cancellation or panic of the caller.
    pub async fn scoped<F, Fut, T>(command: &ClientCommand, work: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut process = ClientProcess::new(command);

        let outcome = match process.start().await {
            Ok(()) => Ok(work().await),
            Err(e) => Err(e),
        };

        process.terminate().await;
        outcome
    }

    /// Launch the command and wait for readiness
    ///
    /// On error the child may still be running; call [`terminate`](Self::terminate).
    pub async fn start(&mut self) -> Result<(), ClientError> {
        let pattern = match self.command.ready_regex.as_deref() {
            Some(pattern) => match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(source) => {
                    self.state = ClientState::Failed;
                    return Err(ClientError::Pattern { pattern: pattern.to_string(), source });
                }
            },
            None => None,
        };

        self.state = ClientState::Starting;
        if let Err(e) = self.spawn() {
            self.state = ClientState::Failed;
            return Err(e);
        }

        match self.wait_ready(pattern).await {
            Ok(()) => {
                debug!(command = %self.command.start_command, "Client process ready");
                self.state = ClientState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(command = %self.command.start_command, "Client process failed: {}", e);
                self.state = ClientState::Failed;
                Err(e)
            }
        }
    }

    fn spawn(&mut self) -> Result<(), ClientError> {
        let mut child = shell_command(&self.command.start_command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClientError::Spawn {
                command: self.command.start_command.clone(),
                source,
            })?;

        info!(command = %self.command.start_command, pid = ?child.id(), "Started client process");

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, tx);
        }

        self.pgid = child.id();
        self.child = Some(child);
        self.output = Some(rx);
        Ok(())
    }

    async fn wait_ready(&mut self, pattern: Option<Regex>) -> Result<(), ClientError> {
        let startup_timeout = self.command.startup_timeout();

        let Some(pattern) = pattern else {
            sleep(NO_PATTERN_HEAD_START.min(startup_timeout)).await;
            return Ok(());
        };

        let Some(output) = self.output.as_mut() else {
            return Err(ClientError::OutputClosed);
        };

        let deadline = Instant::now() + startup_timeout;
        let mut seen = String::new();

        loop {
            match timeout_at(deadline, output.recv()).await {
                Err(_) => return Err(ClientError::NotReady(startup_timeout)),
                Ok(None) => return Err(ClientError::OutputClosed),
                Ok(Some(chunk)) => {
                    seen.push_str(&String::from_utf8_lossy(&chunk));
                    if pattern.is_match(&seen) {
                        return Ok(());
                    }
                    trim_front(&mut seen, MAX_SCANNED_OUTPUT);
                }
            }
        }
    }

    /// Stop the client: polite signal, bounded wait, then force kill
    ///
    /// Never fails; errors while killing are logged and dropped.
    pub async fn terminate(&mut self) {
        // Stop scanning output; the forwarders keep draining the pipes
        self.output = None;

        let Some(mut child) = self.child.take() else {
            if self.state != ClientState::Failed {
                self.state = ClientState::Terminated;
            }
            return;
        };

        let failed = self.state == ClientState::Failed;
        if !failed {
            self.state = ClientState::Terminating;
        }

        let pgid = self.pgid.take();
        let running = !matches!(child.try_wait(), Ok(Some(_)));

        // Helpers forked by the shell can outlive it, so the group is signalled either way
        signal_terminate(&mut child, pgid);

        if running && timeout(self.grace_period, child.wait()).await.is_err() {
            warn!(
                command = %self.command.start_command,
                "Client process ignored termination for {:?}, killing it",
                self.grace_period
            );
            if let Err(e) = child.kill().await {
                debug!("Force kill of client process failed: {}", e);
            }
        }
        force_kill_group(pgid);

        debug!(command = %self.command.start_command, "Client process terminated");
        if !failed {
            self.state = ClientState::Terminated;
        }
    }
}

impl Drop for ClientProcess {
    fn drop(&mut self) {
        force_kill_group(self.pgid.take());
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

fn forward_output<R>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    // Receiver gone after readiness; keep draining so the child never blocks
                    let _ = tx.send(buf[..n].to_vec());
                }
            }
        }
    });
}

/// Drop the oldest output so at most `max` bytes stay buffered
fn trim_front(buffer: &mut String, max: usize) {
    if buffer.len() <= max {
        return;
    }
    let mut cut = buffer.len() - max;
    while !buffer.is_char_boundary(cut) {
        cut += 1;
    }
    buffer.drain(..cut);
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut command = std::process::Command::new("/bin/sh");
    command.arg("-c").arg(command_line);
    // Own process group, so helpers forked by the shell are signalled too
    command.process_group(0);
    Command::from(command)
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}

#[cfg(unix)]
fn signal_group(pgid: Option<u32>, signal: libc::c_int) {
    if let Some(pgid) = pgid {
        // SAFETY: plain syscall on the group we created at spawn time.
        // ESRCH once every member has exited is expected and ignored.
        unsafe {
            libc::kill(-(pgid as libc::pid_t), signal);
        }
    }
}

#[cfg(unix)]
fn signal_terminate(_child: &mut Child, pgid: Option<u32>) {
    signal_group(pgid, libc::SIGTERM);
}

#[cfg(windows)]
fn signal_terminate(child: &mut Child, _pgid: Option<u32>) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn force_kill_group(pgid: Option<u32>) {
    signal_group(pgid, libc::SIGKILL);
}

#[cfg(windows)]
fn force_kill_group(_pgid: Option<u32>) {}
