use chrono::Utc;
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    catalog::Clip,
    engine::PlaybackTimings,
    queue::{PlayRequest, QueueRegistry},
};
use crate::{
    error::ConnectionError,
    voice::{VoiceConnector, VoiceSession},
};

enum WorkerState {
    Connecting(PlayRequest),
    Playing(PlayRequest),
    /// A request just finished; look for the next one.
    Continuing(Arc<Clip>),
    /// Queue was empty after this clip; hold its trailing delay, then leave.
    Draining(Arc<Clip>),
    /// Left voice and released the server.
    Disconnected,
    /// Stop now and drop whatever is still queued.
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy)]
enum AbortReason {
    Connection,
    Shutdown,
}

enum Completion {
    Finished,
    Interrupted,
}

/// Serves one server's queue until it runs dry.
///
/// The worker owns the voice session for its server. Consecutive requests
/// reuse the session; the server's queue entry is removed only after the
/// session has been released, so a new worker for the same server never
/// overlaps this one.
pub(crate) struct PlaybackWorker {
    guild_id: GuildId,
    registry: Arc<QueueRegistry>,
    connector: Arc<dyn VoiceConnector>,
    timings: PlaybackTimings,
    shutdown: CancellationToken,
    session: Option<Box<dyn VoiceSession>>,
}

impl PlaybackWorker {
    pub(crate) fn new(
        guild_id: GuildId,
        registry: Arc<QueueRegistry>,
        connector: Arc<dyn VoiceConnector>,
        timings: PlaybackTimings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            guild_id,
            registry,
            connector,
            timings,
            shutdown,
            session: None,
        }
    }

    pub(crate) async fn run(mut self, first: PlayRequest) {
        info!("▶️ Playback started in guild {}", self.guild_id);
        let mut state = WorkerState::Connecting(first);

        loop {
            state = match state {
                WorkerState::Connecting(request) => match self.connect(&request).await {
                    Ok(true) => WorkerState::Playing(request),
                    Ok(false) => WorkerState::Aborted(AbortReason::Shutdown),
                    Err(e) => {
                        error!("❌ Guild {}: {}", self.guild_id, e);
                        WorkerState::Aborted(AbortReason::Connection)
                    }
                },
                WorkerState::Playing(request) => match self.play(&request).await {
                    Ok(Completion::Finished) => WorkerState::Continuing(request.clip),
                    Ok(Completion::Interrupted) => WorkerState::Aborted(AbortReason::Shutdown),
                    Err(e) => {
                        error!("❌ Guild {}: {}", self.guild_id, e);
                        WorkerState::Aborted(AbortReason::Connection)
                    }
                },
                WorkerState::Continuing(last) => match self.registry.next(self.guild_id) {
                    Some(next) => WorkerState::Connecting(next),
                    None => WorkerState::Draining(last),
                },
                WorkerState::Draining(last) => self.drain(last).await,
                WorkerState::Disconnected => {
                    info!("💤 Guild {} is idle", self.guild_id);
                    break;
                }
                WorkerState::Aborted(reason) => {
                    self.abort(reason).await;
                    break;
                }
            };
        }
    }

    /// Makes sure the session sits in the request's channel. Returns
    /// `false` if shutdown arrived before or while connecting.
    async fn connect(&mut self, request: &PlayRequest) -> Result<bool, ConnectionError> {
        // A worker spawned after shutdown began must not open a session.
        if self.shutdown.is_cancelled() {
            return Ok(false);
        }

        if let Some(session) = self.session.as_mut() {
            if session.channel() == request.channel_id {
                return Ok(true);
            }

            session.switch_channel(request.channel_id).await?;
            return Ok(pause(&self.shutdown, self.timings.settle).await);
        }

        let session = self.connector.join(self.guild_id, request.channel_id).await?;
        self.session = Some(session);
        Ok(true)
    }

    async fn play(&mut self, request: &PlayRequest) -> Result<Completion, ConnectionError> {
        let clip = &request.clip;
        if !clip.is_playable() {
            warn!("⚠️ Clip {} ({}) has no frames, skipping", clip.name(), clip.source());
            return Ok(Completion::Finished);
        }

        if !pause(&self.shutdown, self.timings.pre_roll).await {
            return Ok(Completion::Interrupted);
        }

        let waited = Utc::now().signed_duration_since(request.requested_at);
        debug!(
            "🎵 Playing {} for {} in guild {} (waited {} ms)",
            clip.name(),
            request.requested_by,
            self.guild_id,
            waited.num_milliseconds()
        );

        let session = self.session.as_mut().ok_or(ConnectionError::Closed)?;
        session.set_speaking(true).await?;

        let mut completion = Completion::Finished;
        for frame in clip.frames() {
            if self.shutdown.is_cancelled() {
                completion = Completion::Interrupted;
                break;
            }
            session.send_frame(frame.clone()).await?;
        }

        session.set_speaking(false).await?;
        Ok(completion)
    }

    async fn drain(&mut self, last: Arc<Clip>) -> WorkerState {
        if !pause(&self.shutdown, last.trailing_delay()).await {
            return WorkerState::Aborted(AbortReason::Shutdown);
        }

        if self.registry.has_pending(self.guild_id) {
            return WorkerState::Continuing(last);
        }

        self.release_session().await;

        // A request may have slipped in while leaving; serve it with a
        // fresh session instead of dropping it.
        if self.registry.release_if_idle(self.guild_id) {
            WorkerState::Disconnected
        } else {
            WorkerState::Continuing(last)
        }
    }

    async fn abort(&mut self, reason: AbortReason) {
        self.release_session().await;

        let abandoned = self.registry.abandon(self.guild_id);
        match reason {
            AbortReason::Connection => warn!(
                "⚠️ Playback aborted in guild {}, {} queued requests abandoned",
                self.guild_id, abandoned
            ),
            AbortReason::Shutdown => info!(
                "🛑 Playback stopped for shutdown in guild {} ({} queued requests dropped)",
                self.guild_id, abandoned
            ),
        }
    }

    async fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.disconnect().await;
        }
    }
}

/// Sleeps unless shutdown is requested first. Returns `false` on shutdown.
async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    if shutdown.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::queue::Admission, voice::MockVoiceConnector};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, UserId};

    #[tokio::test]
    async fn worker_started_after_shutdown_never_joins() {
        // No join expectation: any connection attempt fails the test.
        let connector = MockVoiceConnector::new();
        let registry = Arc::new(QueueRegistry::new(6));
        let guild = GuildId::new(3);
        let clip = Arc::new(Clip::with_frames(
            "Classic",
            "Wow!",
            Duration::ZERO,
            vec![Bytes::from_static(b"frame")],
        ));
        let request = || PlayRequest::new(guild, ChannelId::new(30), UserId::new(4), clip.clone());

        let Admission::Dispatch(first) = registry.admit(request()) else {
            panic!("idle server should dispatch");
        };
        registry.admit(request());

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        PlaybackWorker::new(
            guild,
            registry.clone(),
            Arc::new(connector),
            PlaybackTimings::default(),
            shutdown,
        )
        .run(first)
        .await;

        assert!(!registry.is_active(guild));
        assert_eq!(registry.pending_len(guild), None);
    }
}
