use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info};

use super::{
    queue::{Admission, PlayRequest, QueueRegistry},
    worker::PlaybackWorker,
};
use crate::voice::VoiceConnector;

/// Fixed pauses of the playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTimings {
    /// Wait after switching channel before sending audio.
    pub settle: Duration,
    /// Wait before the first frame of every request.
    pub pre_roll: Duration,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(125),
            pre_roll: Duration::from_millis(32),
        }
    }
}

/// What happened to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server was idle; a worker started with this request.
    DispatchedImmediately,
    /// Queued behind the active playback at this 1-based position.
    Accepted { position: usize },
    /// The server's queue was full; the request was shed.
    Dropped,
    /// Shutdown is in progress.
    Refused,
}

/// Entry point of the playback subsystem: accepts play requests and runs
/// one worker per server.
#[derive(Clone)]
pub struct PlaybackEngine {
    registry: Arc<QueueRegistry>,
    connector: Arc<dyn VoiceConnector>,
    timings: PlaybackTimings,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

impl PlaybackEngine {
    pub fn new(connector: Arc<dyn VoiceConnector>, capacity: usize, timings: PlaybackTimings) -> Self {
        Self {
            registry: Arc::new(QueueRegistry::new(capacity)),
            connector,
            timings,
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
        }
    }

    /// Hands a request to its server. Never waits for queue space.
    ///
    /// Must be called from within the tokio runtime.
    pub fn submit(&self, request: PlayRequest) -> SubmitOutcome {
        let guild_id = request.guild_id;

        match self.registry.admit(request) {
            Admission::Dispatch(request) => {
                let worker = PlaybackWorker::new(
                    guild_id,
                    self.registry.clone(),
                    self.connector.clone(),
                    self.timings,
                    self.shutdown.clone(),
                );
                self.workers.spawn(worker.run(request));
                SubmitOutcome::DispatchedImmediately
            }
            Admission::Queued { position } => {
                debug!("➕ Queued in guild {} at position {}", guild_id, position);
                SubmitOutcome::Accepted { position }
            }
            Admission::Full(request) => {
                info!(
                    "🚫 Queue full in guild {} ({} waiting), dropped {} from {}",
                    guild_id,
                    self.registry.capacity(),
                    request.clip.name(),
                    request.requested_by
                );
                SubmitOutcome::Dropped
            }
            Admission::Closed(_) => {
                debug!("Shutting down, refused request for guild {}", guild_id);
                SubmitOutcome::Refused
            }
        }
    }

    /// Whether a worker currently owns `guild_id`.
    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.registry.is_active(guild_id)
    }

    pub fn pending_len(&self, guild_id: GuildId) -> Option<usize> {
        self.registry.pending_len(guild_id)
    }

    pub fn active_servers(&self) -> usize {
        self.registry.active_servers()
    }

    /// Stops accepting requests, lets every worker finish the frame it is
    /// sending, then waits until all of them have left voice.
    pub async fn shutdown(&self) {
        info!(
            "⚠️ Stopping playback ({} active servers)",
            self.registry.active_servers()
        );

        self.registry.close();
        self.shutdown.cancel();
        self.workers.close();
        self.workers.wait().await;

        info!("✅ All voice sessions released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::catalog::Clip, error::ConnectionError, voice::MockVoiceConnector};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, UserId};

    fn request(clip: &Arc<Clip>) -> PlayRequest {
        PlayRequest::new(GuildId::new(1), ChannelId::new(10), UserId::new(7), clip.clone())
    }

    async fn wait_idle(engine: &PlaybackEngine, guild_id: GuildId) {
        while engine.is_active(guild_id) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn join_failure_abandons_backlog() {
        let mut connector = MockVoiceConnector::new();
        connector
            .expect_join()
            .times(2)
            .returning(|_, channel| {
                Err(ConnectionError::Join {
                    channel,
                    reason: "missing permissions".to_string(),
                })
            });

        let engine = PlaybackEngine::new(Arc::new(connector), 6, PlaybackTimings::default());
        let clip = Arc::new(Clip::with_frames(
            "Classic",
            "Wow!",
            Duration::ZERO,
            vec![Bytes::from_static(b"frame")],
        ));
        let guild = GuildId::new(1);

        assert_eq!(engine.submit(request(&clip)), SubmitOutcome::DispatchedImmediately);
        assert_eq!(engine.submit(request(&clip)), SubmitOutcome::Accepted { position: 1 });
        assert_eq!(engine.submit(request(&clip)), SubmitOutcome::Accepted { position: 2 });

        wait_idle(&engine, guild).await;
        assert_eq!(engine.pending_len(guild), None);

        // The server is idle again, so the next trigger starts over.
        assert_eq!(engine.submit(request(&clip)), SubmitOutcome::DispatchedImmediately);
        wait_idle(&engine, guild).await;
    }

    #[tokio::test]
    async fn shutdown_refuses_new_requests() {
        let connector = MockVoiceConnector::new();
        let engine = PlaybackEngine::new(Arc::new(connector), 6, PlaybackTimings::default());
        let clip = Arc::new(Clip::unloaded("Classic", "Wow!", Duration::ZERO));

        engine.shutdown().await;

        assert_eq!(engine.submit(request(&clip)), SubmitOutcome::Refused);
        assert_eq!(engine.active_servers(), 0);
    }

    #[test]
    fn default_timings_match_transport_needs() {
        let timings = PlaybackTimings::default();
        assert_eq!(timings.settle, Duration::from_millis(125));
        assert_eq!(timings.pre_roll, Duration::from_millis(32));
    }
}
