use anyhow::Result;
use clap::{ArgAction, Parser};
use std::{path::PathBuf, time::Duration};

use crate::{
    audio::{engine::PlaybackTimings, queue::DEFAULT_QUEUE_CAPACITY},
    voice::dca::OpusFormat,
};

/// Runtime configuration, from flags or environment (`.env` is honoured).
#[derive(Debug, Clone, Parser)]
#[command(name = "soundboard-bot", version, about)]
pub struct Config {
    // Discord
    /// Bot token
    #[arg(
        short = 't',
        long = "token",
        env = "DISCORD_TOKEN",
        default_value = "",
        hide_default_value = true,
        hide_env_values = true
    )]
    pub discord_token: String,

    /// Activity text shown once connected
    #[arg(long, env = "STATUS_TEXT", default_value = "Absolute Garbage")]
    pub status_text: String,

    // Clips
    /// Directory holding `<source>.dca` clip files
    #[arg(long, env = "SOUND_DIR", default_value = "SoundFiles")]
    pub sound_dir: PathBuf,

    /// JSON manifest of clip sets; the built-in sets are used when absent
    #[arg(long, env = "CLIP_MANIFEST")]
    pub clip_manifest: Option<PathBuf>,

    // Playback
    #[arg(long, env = "MAX_QUEUE_SIZE", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub max_queue_size: usize,

    #[arg(long, env = "SETTLE_MS", default_value_t = 125)]
    pub settle_ms: u64,

    #[arg(long, env = "PRE_ROLL_MS", default_value_t = 32)]
    pub pre_roll_ms: u64,

    /// Frames buffered ahead of the voice connection
    #[arg(long, env = "STREAM_BUFFER_FRAMES", default_value_t = 16)]
    pub stream_buffer_frames: usize,

    /// Bitrate advertised for the pre-encoded clips
    #[arg(long, env = "OPUS_BITRATE", default_value_t = 128_000)]
    pub opus_bitrate: u32,

    /// Reply in chat when a request is dropped because the queue is full
    #[arg(long, env = "NOTIFY_QUEUE_FULL", default_value_t = false, action = ArgAction::Set)]
    pub notify_queue_full: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::parse();
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values.
    ///
    /// A missing token is fatal: nothing else is initialised without it.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!(
                "No token provided. Run `soundboard-bot -t <bot token>` or set DISCORD_TOKEN"
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.stream_buffer_frames == 0 {
            anyhow::bail!("Stream buffer must hold at least one frame");
        }

        if !(8_000..=510_000).contains(&self.opus_bitrate) {
            anyhow::bail!(
                "Opus bitrate must be between 8kbps and 510kbps, got: {}",
                self.opus_bitrate
            );
        }

        Ok(())
    }

    pub fn timings(&self) -> PlaybackTimings {
        PlaybackTimings {
            settle: Duration::from_millis(self.settle_ms),
            pre_roll: Duration::from_millis(self.pre_roll_ms),
        }
    }

    pub fn opus_format(&self) -> OpusFormat {
        OpusFormat {
            bitrate: self.opus_bitrate,
            ..OpusFormat::default()
        }
    }

    /// Loggable summary; never includes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Clips: {} (manifest: {})\n  \
            Playback: queue {}, settle {}, pre-roll {}, buffer {} frames\n  \
            Audio: {}kbps\n  \
            Queue full notice: {}",
            self.sound_dir.display(),
            self.clip_manifest
                .as_ref()
                .map_or("built-in".to_string(), |p| p.display().to_string()),
            self.max_queue_size,
            humantime::format_duration(Duration::from_millis(self.settle_ms)),
            humantime::format_duration(Duration::from_millis(self.pre_roll_ms)),
            self.stream_buffer_frames,
            self.opus_bitrate / 1000,
            self.notify_queue_full,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_flag_and_defaults() {
        let config = Config::try_parse_from(["soundboard-bot", "-t", "abc"]).unwrap();

        assert_eq!(config.discord_token, "abc");
        assert_eq!(config.max_queue_size, 6);
        assert_eq!(config.timings(), PlaybackTimings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_token_is_fatal() {
        let config = Config::try_parse_from(["soundboard-bot", "-t", "  "]).unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("No token provided"));
    }

    #[test]
    fn rejects_empty_queue() {
        let config =
            Config::try_parse_from(["soundboard-bot", "-t", "abc", "--max-queue-size", "0"]).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config::try_parse_from(["soundboard-bot", "-t", "secret-token"]).unwrap();

        let summary = config.summary();
        assert!(!summary.contains("secret-token"));
        assert!(summary.contains("125ms"));
    }
}
