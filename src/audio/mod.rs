//! # Audio Module
//!
//! Clip playback engine for the soundboard.
//!
//! ## Architecture
//!
//! ### [`loader`] - Clip Files
//! - Parses `[u16 LE length][opus frame]` records into memory at startup
//! - Distinguishes a clean end of file from a truncated frame
//!
//! ### [`catalog`] - Clip Sets
//! - Named sets of clips addressed by triggers
//! - Exact-match clip selection or uniform random selection
//!
//! ### [`queue`] - Per-Server Queues
//! - One bounded FIFO per server, created and removed under a single lock
//! - Full queues shed new requests instead of blocking the caller
//!
//! ### [`engine`] / `worker` - Playback
//! - At most one worker per server, reusing its voice session across the
//!   backlog and leaving voice once the queue runs dry
//! - Graceful shutdown between frames
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use soundboard_bot::audio::{engine::{PlaybackEngine, PlaybackTimings}, queue::PlayRequest};
//! # use std::sync::Arc;
//! # use serenity::all::{ChannelId, GuildId, UserId};
//! # async fn example(connector: Arc<dyn soundboard_bot::voice::VoiceConnector>, clip: Arc<soundboard_bot::audio::catalog::Clip>) {
//! let engine = PlaybackEngine::new(connector, 6, PlaybackTimings::default());
//!
//! let request = PlayRequest::new(GuildId::new(1), ChannelId::new(2), UserId::new(3), clip);
//! engine.submit(request);
//!
//! engine.shutdown().await;
//! # }
//! ```

pub mod catalog;
pub mod engine;
pub mod loader;
pub mod queue;
mod worker;

pub use catalog::{Clip, ClipCatalog, ClipSet};
pub use engine::{PlaybackEngine, PlaybackTimings, SubmitOutcome};
pub use queue::PlayRequest;
