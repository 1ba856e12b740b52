use std::{io, path::PathBuf};

use serenity::model::id::ChannelId;
use thiserror::Error;

/// Failure while turning a clip file into its frame sequence.
///
/// A load error is local to one clip: the clip stays unplayable and the
/// rest of the catalog is unaffected.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not open clip file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("frame {index} is truncated or unreadable: {source}")]
    Frame {
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// Failure of the voice transport while serving one play request.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("could not join voice channel {channel}: {reason}")]
    Join { channel: ChannelId, reason: String },

    #[error("could not switch to voice channel {channel}: {reason}")]
    Switch { channel: ChannelId, reason: String },

    #[error("could not start the audio stream: {0}")]
    Stream(String),

    #[error("voice session closed while sending audio")]
    Closed,
}
