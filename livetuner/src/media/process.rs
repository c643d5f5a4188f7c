use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

/// How a playback process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited on its own within the grace window.
    Graceful,
    /// Had to be killed.
    Killed,
}

/**
    A running playback process whose stdout carries the media bytes.

    The child is spawned with `kill_on_drop`, so dropping the handle without
    calling [`PlaybackProcess::terminate`] or [`PlaybackProcess::wait_or_kill`]
    still takes the process down.
*/
pub struct PlaybackProcess {
    label: String,
    child: Child,
}

impl PlaybackProcess {
    pub fn spawn(mut command: Command, label: &str) -> io::Result<Self> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        debug!(process = label, pid = ?child.id(), "playback process started");
        Ok(Self {
            label: label.to_string(),
            child,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Give the process `grace` to exit by itself, then kill it.
    pub async fn wait_or_kill(mut self, grace: Duration) -> io::Result<ExitKind> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(process = %self.label, ?status, "playback process exited");
                Ok(ExitKind::Graceful)
            }
            Err(_) => {
                warn!(
                    process = %self.label,
                    grace_secs = grace.as_secs_f32(),
                    "playback process did not exit in time, killing"
                );
                self.kill().await?;
                Ok(ExitKind::Killed)
            }
        }
    }

    /// Kill the process now, unless it already exited, and reap it.
    pub async fn terminate(mut self) -> io::Result<ExitKind> {
        if let Some(status) = self.child.try_wait()? {
            debug!(process = %self.label, ?status, "playback process already exited");
            return Ok(ExitKind::Graceful);
        }
        self.kill().await?;
        Ok(ExitKind::Killed)
    }

    async fn kill(&mut self) -> io::Result<()> {
        // kill() sends SIGKILL and waits for the exit status.
        self.child.kill().await?;
        debug!(process = %self.label, "playback process killed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn shell(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}
