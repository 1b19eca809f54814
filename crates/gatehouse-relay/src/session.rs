//! One transcoder process per connected client.
//!
//! The session reads JPEG frames from the transcoder, wraps each in a
//! multipart section and writes it to the client. It ends on the first of
//! transcoder exit, stream error or client disconnect.
//!
//! # Shutdown on client disconnect
//!
//! ```text
//! peer gone ──> closed = true ──> SIGTERM ──(grace)──> SIGKILL ──> sink finished once
//! ```
//!
//! The transcoder may keep producing output until it dies; none of it
//! reaches the client because the closed flag is checked before every
//! write.

use crate::error::{RelayError, RelayResult};
use crate::sink::{GuardedSink, Outbound};
use futures::StreamExt;
use gatehouse_protocol::{MjpegCodec, encode_part};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client disconnected; the transcoder was terminated
    ClientGone,
    /// Transcoder exited with status 0
    Completed,
    /// Transcoder failed or its output could not be read
    Failed,
}

/// Outcome of [`StreamSession::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub end: SessionEnd,
    /// Frames decoded from the transcoder
    pub frames: u64,
    /// Sections delivered to the client
    pub sections: u64,
    /// Whether SIGKILL was needed after the grace period
    pub forced_kill: bool,
}

enum Ending {
    ClientGone,
    Eof,
    Failed(RelayError),
}

/// Running transcoder bound to one client.
#[derive(Debug)]
pub struct StreamSession {
    child: Child,
    frames: FramedRead<ChildStdout, MjpegCodec>,
    grace: Duration,
    stderr_task: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Spawn `command` with piped output.
    ///
    /// # Errors
    /// Returns `RelayError::Spawn` if the process cannot be started.
    pub fn spawn(mut command: Command, grace: Duration) -> RelayResult<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn transcoder");
            RelayError::Spawn(e)
        })?;
        let stdout = child.stdout.take().ok_or(RelayError::NoStdout)?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(log_stderr(stderr)));

        info!(pid = ?child.id(), "Transcoder started");

        Ok(Self {
            child,
            frames: FramedRead::new(stdout, MjpegCodec::new()),
            grace,
            stderr_task,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Relay frames to `outbound` until the session ends.
    pub async fn run<O: Outbound>(mut self, outbound: O) -> SessionSummary {
        let mut sink = GuardedSink::new(outbound);
        let mut frames = 0u64;

        let ending = loop {
            tokio::select! {
                _ = sink.peer_gone() => break Ending::ClientGone,
                next = self.frames.next() => match next {
                    Some(Ok(frame)) => {
                        frames += 1;
                        if !sink.write(encode_part(&frame)).await {
                            break Ending::ClientGone;
                        }
                    }
                    Some(Err(e)) => break Ending::Failed(RelayError::Stream(e)),
                    None => break Ending::Eof,
                },
            }
        };

        let mut forced_kill = false;
        let end = match ending {
            Ending::ClientGone => {
                sink.mark_closed();
                info!(frames, "Client disconnected, stopping transcoder");
                forced_kill = self.terminate().await;
                sink.close(None);
                SessionEnd::ClientGone
            }
            Ending::Failed(e) => {
                sink.mark_closed();
                warn!(error = %e, "Stream error, stopping transcoder");
                forced_kill = self.terminate().await;
                sink.close(Some(e));
                SessionEnd::Failed
            }
            Ending::Eof => match self.reap().await {
                Some(code) if code == Some(0) => {
                    info!(frames, "Transcoder finished");
                    sink.close(None);
                    SessionEnd::Completed
                }
                Some(code) => {
                    warn!(?code, frames, "Transcoder exited with failure");
                    sink.close(Some(RelayError::Exited { code }));
                    SessionEnd::Failed
                }
                None => {
                    forced_kill = self.terminate().await;
                    sink.close(Some(RelayError::Exited { code: None }));
                    SessionEnd::Failed
                }
            },
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        SessionSummary {
            end,
            frames,
            sections: sink.sections(),
            forced_kill,
        }
    }

    /// Wait for a process whose stdout closed. `None` if it is still running
    /// after the grace period.
    async fn reap(&mut self) -> Option<Option<i32>> {
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status.code()),
            Ok(Err(e)) => {
                error!(error = %e, "Failed to wait for transcoder");
                Some(None)
            }
            Err(_) => None,
        }
    }

    /// SIGTERM, then SIGKILL if the process outlives the grace period.
    /// Returns whether SIGKILL was needed.
    async fn terminate(&mut self) -> bool {
        let Some(pid) = self.child.id() else {
            return false;
        };

        self.send_sigterm(pid);

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, ?status, "Transcoder exited after SIGTERM");
                false
            }
            Ok(Err(e)) => {
                warn!(pid, error = %e, "Failed to wait for transcoder");
                false
            }
            Err(_) => {
                warn!(
                    pid,
                    grace_secs = self.grace.as_secs_f32(),
                    "Transcoder ignored SIGTERM, sending SIGKILL"
                );
                if let Err(e) = self.child.kill().await {
                    error!(pid, error = %e, "Failed to kill transcoder");
                }
                true
            }
        }
    }

    #[cfg(unix)]
    fn send_sigterm(&mut self, pid: u32) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return;
        };
        debug!(pid, "Sending SIGTERM to transcoder");
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            warn!(pid, error = %e, "Failed to send SIGTERM");
        }
    }

    #[cfg(not(unix))]
    fn send_sigterm(&mut self, pid: u32) {
        if let Err(e) = self.child.start_kill() {
            warn!(pid, error = %e, "Failed to terminate transcoder");
        }
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "gatehouse_relay::transcoder", "{line}");
    }
}
