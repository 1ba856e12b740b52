use async_trait::async_trait;
use bytes::Bytes;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use symphonia::core::{io::MediaSource, probe::Hint};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use super::{
    dca::{DcaStream, OpusFormat, MAX_FRAME_LEN},
    VoiceConnector, VoiceSession,
};
use crate::error::ConnectionError;

/// Longest wait for songbird to drain a finished clip before the track is
/// stopped by force.
const STREAM_END_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects through the songbird voice manager registered on the client.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    buffer_frames: usize,
    format: OpusFormat,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, buffer_frames: usize, format: OpusFormat) -> Self {
        Self {
            manager,
            buffer_frames: buffer_frames.max(1),
            format,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceSession>, ConnectionError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| ConnectionError::Join {
                channel: channel_id,
                reason: e.to_string(),
            })?;

        info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);

        Ok(Box::new(SongbirdSession {
            manager: self.manager.clone(),
            call,
            guild_id,
            channel_id,
            buffer_frames: self.buffer_frames,
            format: self.format,
            stream: None,
        }))
    }
}

/// Clip currently being fed to songbird.
struct ActiveStream {
    frames: flume::Sender<Bytes>,
    ended: oneshot::Receiver<()>,
    track: TrackHandle,
}

struct SongbirdSession {
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    guild_id: GuildId,
    channel_id: ChannelId,
    buffer_frames: usize,
    format: OpusFormat,
    stream: Option<ActiveStream>,
}

impl SongbirdSession {
    async fn start_stream(&mut self) -> Result<(), ConnectionError> {
        let (frames, receiver) = flume::bounded(self.buffer_frames);
        let (ended_tx, ended) = oneshot::channel();

        let mut hint = Hint::new();
        hint.with_extension("dca");

        let source: Box<dyn MediaSource> = Box::new(DcaStream::new(receiver, &self.format));
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: source,
                hint: Some(hint),
            }),
            None,
        );

        let track = self.call.lock().await.play_input(input);

        let notifier = StreamEndNotifier {
            ended: Arc::new(parking_lot::Mutex::new(Some(ended_tx))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            track
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| ConnectionError::Stream(e.to_string()))?;
        }

        self.stream = Some(ActiveStream {
            frames,
            ended,
            track,
        });
        Ok(())
    }

    async fn finish_stream(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        // Closing the sender ends the DCA stream once buffered frames drain.
        drop(stream.frames);

        if tokio::time::timeout(STREAM_END_TIMEOUT, stream.ended).await.is_err() {
            warn!("⏱️ Clip stream in guild {} did not end, stopping track", self.guild_id);
            let _ = stream.track.stop();
        }
    }
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    fn channel(&self) -> ChannelId {
        self.channel_id
    }

    async fn switch_channel(&mut self, channel_id: ChannelId) -> Result<(), ConnectionError> {
        let switch_err = |e: songbird::error::JoinError| ConnectionError::Switch {
            channel: channel_id,
            reason: e.to_string(),
        };

        let join = self.call.lock().await.join(channel_id).await.map_err(switch_err)?;
        join.await.map_err(switch_err)?;

        debug!(
            "🔀 Switched from channel {} to {} in guild {}",
            self.channel_id, channel_id, self.guild_id
        );
        self.channel_id = channel_id;
        Ok(())
    }

    async fn set_speaking(&mut self, speaking: bool) -> Result<(), ConnectionError> {
        match (speaking, self.stream.is_some()) {
            (true, false) => self.start_stream().await,
            (false, true) => {
                self.finish_stream().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn send_frame(&mut self, frame: Bytes) -> Result<(), ConnectionError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| ConnectionError::Stream("speaking was not started".to_string()))?;

        if frame.len() > MAX_FRAME_LEN {
            return Err(ConnectionError::Stream(format!(
                "frame of {} bytes exceeds the {} byte limit",
                frame.len(),
                MAX_FRAME_LEN
            )));
        }

        stream
            .frames
            .send_async(frame)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.track.stop();
        }

        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Left voice channel in guild {}", self.guild_id),
            Err(e) => warn!("⚠️ Could not leave voice in guild {}: {}", self.guild_id, e),
        }
    }
}

/// Fires once when songbird reports the clip track ended or failed.
#[derive(Clone)]
struct StreamEndNotifier {
    ended: Arc<parking_lot::Mutex<Option<oneshot::Sender<()>>>>,
}

#[async_trait]
impl VoiceEventHandler for StreamEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                debug!("Clip track finished: {:?}", state.playing);
            }
        }

        if let Some(ended) = self.ended.lock().take() {
            let _ = ended.send(());
        }
        None
    }
}
