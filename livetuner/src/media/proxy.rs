use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelCatalog, LiveCheck};

use super::cache::ResolutionCache;
use super::process::{ExitKind, PlaybackProcess};
use super::tool::{StreamTool, ToolError};

/// Chunks buffered between the player and the HTTP body.
const BODY_CHANNEL_DEPTH: usize = 16;

/// Default time a player gets to exit after its output closes.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Why a playback request did not start streaming.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("unknown channel {0}")]
    UnknownChannel(String),

    #[error("live status of {0} is unavailable")]
    StatusUnavailable(String),

    #[error("{0} is offline")]
    Offline(String),

    #[error("could not resolve a stream for {channel}: {source}")]
    Resolution {
        channel: String,
        #[source]
        source: ToolError,
    },

    #[error("could not start the player: {0}")]
    Spawn(#[source] ToolError),
}

/// How a stream that did start ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The player closed its output; the broadcast is over or the tool quit.
    Completed(ExitKind),
    /// The client went away and the player was terminated.
    Disconnected,
    /// Reading the player's output failed.
    Failed,
    /// The server is shutting down and the player was terminated.
    Shutdown,
}

/**
    A stream in progress.

    `body` yields the player's output as it arrives. Dropping it is how the
    HTTP layer signals a disconnect; `outcome` resolves once the player has
    been reaped.
*/
pub struct PlaybackSession {
    pub channel: Channel,
    pub broadcast_id: String,
    pub url: String,
    pub cached: bool,
    pub body: mpsc::Receiver<io::Result<Bytes>>,
    pub outcome: JoinHandle<PlaybackOutcome>,
}

/**
    Serves live channels by resolving a media URL and copying a player
    process's stdout to the client.
*/
pub struct StreamProxy {
    catalog: Arc<ChannelCatalog>,
    cache: Arc<ResolutionCache>,
    resolver: Arc<dyn StreamTool>,
    player: Arc<dyn StreamTool>,
    grace: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StreamProxy {
    pub fn new(
        catalog: Arc<ChannelCatalog>,
        cache: Arc<ResolutionCache>,
        resolver: Arc<dyn StreamTool>,
        player: Arc<dyn StreamTool>,
        grace: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            catalog,
            cache,
            resolver,
            player,
            grace,
            shutdown,
        }
    }

    /**
        Start streaming `channel_id`.

        The live status is always re-checked upstream first. Nothing is
        spawned unless the channel is live and a URL was resolved.
    */
    pub async fn open(&self, channel_id: &str) -> Result<PlaybackSession, PlaybackError> {
        let channel = match self.catalog.update_live_status(channel_id).await {
            LiveCheck::Checked(channel) => channel,
            LiveCheck::Unknown => return Err(PlaybackError::UnknownChannel(channel_id.into())),
            LiveCheck::Unavailable(channel) => {
                return Err(PlaybackError::StatusUnavailable(channel.display_name));
            }
        };

        let Some(broadcast_id) = channel.broadcast_id().map(String::from) else {
            return Err(PlaybackError::Offline(channel.display_name));
        };

        debug!(channel = %channel.display_name, broadcast = %broadcast_id, "resolving");
        let address = channel.address();
        let resolver = Arc::clone(&self.resolver);
        let (resolved, cached) = self
            .cache
            .get_or_resolve(&broadcast_id, || async move {
                resolver.resolve_url(&address).await
            })
            .await
            .map_err(|source| PlaybackError::Resolution {
                channel: channel.display_name.clone(),
                source,
            })?;

        if cached {
            let age = crate::util::time::now() - resolved.resolved_at;
            debug!(
                broadcast = %broadcast_id,
                age_secs = age.num_seconds(),
                "reusing resolved url"
            );
        } else {
            info!(
                channel = %channel.display_name,
                broadcast = %broadcast_id,
                tool = self.resolver.name(),
                cached_broadcasts = self.cache.len(),
                "resolved stream url"
            );
        }

        let process = self
            .player
            .start_playback(&resolved.url)
            .map_err(PlaybackError::Spawn)?;

        info!(
            channel = %channel.display_name,
            broadcast = %broadcast_id,
            player = process.label(),
            "streaming"
        );

        let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        let outcome = tokio::spawn(pump(
            process,
            tx,
            Arc::clone(&self.cache),
            broadcast_id.clone(),
            self.grace,
            self.shutdown.clone(),
        ));

        Ok(PlaybackSession {
            channel,
            broadcast_id,
            url: resolved.url,
            cached,
            body: rx,
            outcome,
        })
    }
}

enum CopyEnd {
    Finished,
    Disconnected,
    ReadFailed,
    Shutdown,
}

/// Copy the player's stdout into `tx`, then make sure the player is gone.
async fn pump(
    mut process: PlaybackProcess,
    tx: mpsc::Sender<io::Result<Bytes>>,
    cache: Arc<ResolutionCache>,
    broadcast_id: String,
    grace: Duration,
    shutdown: watch::Receiver<bool>,
) -> PlaybackOutcome {
    let end = match process.take_stdout() {
        Some(stdout) => copy(ReaderStream::new(stdout), &tx, shutdown).await,
        None => CopyEnd::ReadFailed,
    };

    match end {
        CopyEnd::Finished => {
            cache.remove(&broadcast_id);
            drop(tx);
            match process.wait_or_kill(grace).await {
                Ok(exit) => {
                    info!(broadcast = %broadcast_id, ?exit, "stream completed");
                    PlaybackOutcome::Completed(exit)
                }
                Err(e) => {
                    warn!(broadcast = %broadcast_id, error = %e, "failed to reap player");
                    PlaybackOutcome::Failed
                }
            }
        }
        CopyEnd::Disconnected => {
            if let Err(e) = process.terminate().await {
                warn!(broadcast = %broadcast_id, error = %e, "failed to terminate player");
            }
            info!(broadcast = %broadcast_id, "client disconnected");
            PlaybackOutcome::Disconnected
        }
        CopyEnd::Shutdown => {
            drop(tx);
            if let Err(e) = process.terminate().await {
                warn!(broadcast = %broadcast_id, error = %e, "failed to terminate player");
            }
            info!(broadcast = %broadcast_id, "stream stopped for shutdown");
            PlaybackOutcome::Shutdown
        }
        CopyEnd::ReadFailed => {
            if let Err(e) = process.terminate().await {
                warn!(broadcast = %broadcast_id, error = %e, "failed to terminate player");
            }
            PlaybackOutcome::Failed
        }
    }
}

async fn copy<S>(
    mut chunks: S,
    tx: &mpsc::Sender<io::Result<Bytes>>,
    mut shutdown: watch::Receiver<bool>,
) -> CopyEnd
where
    S: futures::Stream<Item = io::Result<Bytes>> + Unpin,
{
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => return CopyEnd::Shutdown,
            _ = tx.closed() => return CopyEnd::Disconnected,
            chunk = chunks.next() => match chunk {
                Some(Ok(bytes)) => {
                    if tx.send(Ok(bytes)).await.is_err() {
                        return CopyEnd::Disconnected;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "reading player output failed");
                    let _ = tx.send(Err(e)).await;
                    return CopyEnd::ReadFailed;
                }
                None => return CopyEnd::Finished,
            },
        }
    }
}

/// Resolves once shutdown is signalled. A dropped sender means it never will be.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BrokerConfig, CredentialBroker};
    use crate::media::tool::{CommandTool, ToolKind};
    use crate::testing::{ACCOUNT, FakeHelix, ScriptedTool};

    struct Fixture {
        api: Arc<FakeHelix>,
        cache: Arc<ResolutionCache>,
        catalog: Arc<ChannelCatalog>,
        tool: Arc<ScriptedTool>,
        proxy: StreamProxy,
        shutdown_tx: watch::Sender<bool>,
    }

    async fn fixture(tool: ScriptedTool, grace: Duration) -> Fixture {
        let api = Arc::new(FakeHelix::new());
        api.add_user("42", "streamer", "Streamer");
        api.add_game("33214", "Fortnite");

        let broker = Arc::new(CredentialBroker::new(
            api.clone(),
            BrokerConfig {
                username: ACCOUNT.to_string(),
                static_token: None,
            },
        ));
        let cache = Arc::new(ResolutionCache::new());
        let catalog = Arc::new(ChannelCatalog::new(
            broker,
            Arc::clone(&cache),
            vec!["streamer".to_string()],
        ));
        assert!(catalog.retrieve().await);

        let tool = Arc::new(tool);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let proxy = StreamProxy::new(
            Arc::clone(&catalog),
            Arc::clone(&cache),
            tool.clone(),
            tool.clone(),
            grace,
            shutdown_rx,
        );

        Fixture {
            api,
            cache,
            catalog,
            tool,
            proxy,
            shutdown_tx,
        }
    }

    async fn read_all(body: &mut mpsc::Receiver<io::Result<Bytes>>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.recv().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_offline_then_live_broadcasts() {
        let f = fixture(ScriptedTool::new("printf chunk"), DEFAULT_EXIT_GRACE).await;

        // Offline: nothing is resolved or spawned.
        let err = f.proxy.open("42").await.err().unwrap();
        assert!(matches!(err, PlaybackError::Offline(_)));
        assert_eq!(f.tool.resolutions(), 0);
        assert_eq!(f.tool.playbacks(), 0);

        // Live as B1: two concurrent viewers share one resolution.
        f.api.set_live("42", "B1", "33214");
        let (a, b) = tokio::join!(f.proxy.open("42"), f.proxy.open("42"));
        let (mut a, mut b) = (a.unwrap(), b.unwrap());
        assert_eq!(f.tool.resolutions(), 1);
        assert_eq!(f.tool.playbacks(), 2);
        assert_eq!(a.url, b.url);
        assert_eq!(a.broadcast_id, "B1");
        assert!(a.cached != b.cached);
        assert_eq!(a.url, "https://video.example/twitch.tv/streamer/1.m3u8");

        assert_eq!(read_all(&mut a.body).await, b"chunk");
        assert_eq!(read_all(&mut b.body).await, b"chunk");
        assert_eq!(
            a.outcome.await.unwrap(),
            PlaybackOutcome::Completed(ExitKind::Graceful)
        );
        assert_eq!(
            b.outcome.await.unwrap(),
            PlaybackOutcome::Completed(ExitKind::Graceful)
        );
        assert!(f.cache.get("B1").is_none());

        // Broadcast ends, then the channel goes live again as B2.
        f.api.set_offline("42");
        assert!(f.catalog.refresh_status().await);
        f.api.set_live("42", "B2", "33214");
        let mut c = f.proxy.open("42").await.unwrap();
        assert_eq!(f.tool.resolutions(), 2);
        assert!(!c.cached);
        assert_eq!(c.broadcast_id, "B2");
        assert_eq!(c.url, "https://video.example/twitch.tv/streamer/2.m3u8");
        assert_eq!(read_all(&mut c.body).await, b"chunk");
        c.outcome.await.unwrap();
    }

    #[tokio::test]
    async fn test_resolved_url_reused_while_streaming() {
        let f = fixture(ScriptedTool::new("sleep 30"), DEFAULT_EXIT_GRACE).await;
        f.api.set_live("42", "B1", "33214");

        let first = f.proxy.open("42").await.unwrap();
        let second = f.proxy.open("42").await.unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(f.tool.resolutions(), 1);
        assert!(f.cache.get("B1").is_some());

        drop(first.body);
        drop(second.body);
        assert_eq!(first.outcome.await.unwrap(), PlaybackOutcome::Disconnected);
        assert_eq!(second.outcome.await.unwrap(), PlaybackOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_terminates_player() {
        let f = fixture(ScriptedTool::new("yes"), DEFAULT_EXIT_GRACE).await;
        f.api.set_live("42", "B1", "33214");

        let mut session = f.proxy.open("42").await.unwrap();
        let chunk = session.body.recv().await.unwrap().unwrap();
        assert!(chunk.starts_with(b"y\n"));

        drop(session.body);
        let outcome = tokio::time::timeout(Duration::from_secs(10), session.outcome)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_noticed_while_player_silent() {
        let f = fixture(ScriptedTool::new("sleep 30"), DEFAULT_EXIT_GRACE).await;
        f.api.set_live("42", "B1", "33214");

        let session = f.proxy.open("42").await.unwrap();
        drop(session.body);
        let outcome = tokio::time::timeout(Duration::from_secs(5), session.outcome)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_hung_player_killed_after_grace() {
        let f = fixture(
            ScriptedTool::new("printf x; exec 1>&-; sleep 30"),
            Duration::from_millis(200),
        )
        .await;
        f.api.set_live("42", "B1", "33214");

        let mut session = f.proxy.open("42").await.unwrap();
        assert_eq!(read_all(&mut session.body).await, b"x");
        let outcome = tokio::time::timeout(Duration::from_secs(10), session.outcome)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed(ExitKind::Killed));
        assert!(f.cache.get("B1").is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_unavailable_channels() {
        let f = fixture(ScriptedTool::new("true"), DEFAULT_EXIT_GRACE).await;
        let err = f.proxy.open("999").await.err().unwrap();
        assert!(matches!(err, PlaybackError::UnknownChannel(id) if id == "999"));

        f.api.set_live("42", "B1", "33214");
        f.api.set_fail_streams(true);
        let err = f.proxy.open("42").await.err().unwrap();
        assert!(matches!(err, PlaybackError::StatusUnavailable(_)));
        assert_eq!(f.tool.playbacks(), 0);
    }

    #[tokio::test]
    async fn test_failed_resolution_caches_nothing() {
        let f = fixture(ScriptedTool::failing(), DEFAULT_EXIT_GRACE).await;
        f.api.set_live("42", "B1", "33214");

        let err = f.proxy.open("42").await.err().unwrap();
        assert!(matches!(err, PlaybackError::Resolution { .. }));
        assert!(f.cache.get("B1").is_none());
        assert_eq!(f.tool.playbacks(), 0);

        f.proxy.open("42").await.err().unwrap();
        assert_eq!(f.tool.resolutions(), 2);
    }

    #[tokio::test]
    async fn test_player_spawn_failure() {
        let f = fixture(ScriptedTool::new("true"), DEFAULT_EXIT_GRACE).await;
        let player: Arc<dyn StreamTool> = Arc::new(CommandTool::new(
            ToolKind::Streamlink,
            "/nonexistent/streamlink",
        ));
        let proxy = StreamProxy::new(
            Arc::clone(&f.catalog),
            Arc::clone(&f.cache),
            f.tool.clone(),
            player,
            DEFAULT_EXIT_GRACE,
            f.shutdown_tx.subscribe(),
        );
        f.api.set_live("42", "B1", "33214");

        let err = proxy.open("42").await.err().unwrap();
        assert!(matches!(err, PlaybackError::Spawn(_)));
        // The resolved URL stays usable for the next viewer.
        assert!(f.cache.get("B1").is_some());
    }

    #[tokio::test]
    async fn test_shutdown_stops_open_streams() {
        let f = fixture(
            ScriptedTool::new("while true; do printf x; sleep 0.1; done"),
            DEFAULT_EXIT_GRACE,
        )
        .await;
        f.api.set_live("42", "B1", "33214");

        let mut session = f.proxy.open("42").await.unwrap();
        let chunk = session.body.recv().await.unwrap().unwrap();
        assert!(chunk.iter().all(|b| *b == b'x'));

        f.shutdown_tx.send(true).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), session.outcome)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Shutdown);

        // The body ends so the HTTP response can finish.
        let rest = tokio::time::timeout(Duration::from_secs(5), read_all(&mut session.body))
            .await
            .unwrap();
        assert!(rest.iter().all(|b| *b == b'x'));
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_keeps_streaming() {
        let f = fixture(ScriptedTool::new("sleep 0.3; printf done"), DEFAULT_EXIT_GRACE).await;
        f.api.set_live("42", "B1", "33214");

        let mut session = f.proxy.open("42").await.unwrap();
        drop(f.shutdown_tx);
        assert_eq!(read_all(&mut session.body).await, b"done");
        assert_eq!(
            session.outcome.await.unwrap(),
            PlaybackOutcome::Completed(ExitKind::Graceful)
        );
    }
}
