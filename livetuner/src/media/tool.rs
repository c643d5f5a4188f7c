use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use clap::ValueEnum;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use super::process::PlaybackProcess;

/**
    Errors from the external resolver/player tools.
*/
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} produced no stream URL")]
    NoUrl(String),
}

/**
    An external tool that can turn a channel address into a media URL and
    play a media URL to stdout.
*/
#[async_trait]
pub trait StreamTool: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve a public channel address into a playable media URL.
    async fn resolve_url(&self, address: &str) -> Result<String, ToolError>;

    /// Start a process that writes the media at `url` to its stdout.
    fn start_playback(&self, url: &str) -> Result<PlaybackProcess, ToolError>;
}

/// The supported external tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolKind {
    #[value(alias = "youtube_dl")]
    YoutubeDl,
    Streamlink,
}

/**
    A [`StreamTool`] backed by a command-line program.
*/
#[derive(Debug, Clone)]
pub struct CommandTool {
    kind: ToolKind,
    program: PathBuf,
}

impl CommandTool {
    pub fn new(kind: ToolKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    fn resolve_args(&self, address: &str) -> Vec<String> {
        match self.kind {
            ToolKind::YoutubeDl => args(&["-q", "--no-warnings", address, "--get-url"]),
            ToolKind::Streamlink => args(&[address, "best", "--quiet", "--stream-url"]),
        }
    }

    fn playback_args(&self, url: &str) -> Vec<String> {
        match self.kind {
            ToolKind::YoutubeDl => args(&["-q", "--no-warnings", url, "-o", "-"]),
            ToolKind::Streamlink => args(&[url, "best", "--stdout", "--quiet"]),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        info!(tool = self.name(), program = %self.program.display(), args = ?args, "executing");
        let mut command = Command::new(&self.program);
        command.args(args).stdin(Stdio::null()).stderr(Stdio::null());
        command
    }
}

#[async_trait]
impl StreamTool for CommandTool {
    fn name(&self) -> &str {
        match self.kind {
            ToolKind::YoutubeDl => "youtube-dl",
            ToolKind::Streamlink => "streamlink",
        }
    }

    async fn resolve_url(&self, address: &str) -> Result<String, ToolError> {
        let output = self
            .command(&self.resolve_args(address))
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        first_url(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| ToolError::NoUrl(self.name().to_string()))
    }

    fn start_playback(&self, url: &str) -> Result<PlaybackProcess, ToolError> {
        PlaybackProcess::spawn(self.command(&self.playback_args(url)), self.name()).map_err(
            |source| ToolError::Spawn {
                program: self.program.display().to_string(),
                source,
            },
        )
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// First non-empty line of resolver output.
fn first_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
}
