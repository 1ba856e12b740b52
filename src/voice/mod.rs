//! # Voice Module
//!
//! Transport seam between the playback workers and Discord voice.
//!
//! Workers only see two traits:
//!
//! - [`VoiceConnector`] joins a voice channel and hands back a session
//! - [`VoiceSession`] switches channel, toggles speaking, sends encoded
//!   frames and disconnects
//!
//! The production implementation lives in [`call`] and drives songbird;
//! frames are forwarded untouched as a DCA stream (see [`dca`]).

use async_trait::async_trait;
use bytes::Bytes;
use serenity::model::id::{ChannelId, GuildId};

use crate::error::ConnectionError;

pub mod call;
pub mod dca;

pub use call::SongbirdConnector;

/// Opens voice sessions on a server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceSession>, ConnectionError>;
}

/// A live voice connection owned by exactly one playback worker.
#[async_trait]
pub trait VoiceSession: Send {
    /// Channel currently joined.
    fn channel(&self) -> ChannelId;

    async fn switch_channel(&mut self, channel_id: ChannelId) -> Result<(), ConnectionError>;

    /// Turning speaking off completes once every frame already sent has
    /// been handed to the voice connection.
    async fn set_speaking(&mut self, speaking: bool) -> Result<(), ConnectionError>;

    /// Sends one encoded frame; waits while the transport buffer is full.
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), ConnectionError>;

    async fn disconnect(&mut self);
}
