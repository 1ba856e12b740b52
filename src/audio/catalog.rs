use anyhow::{Context, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

use super::loader::load_clip_file;
use crate::voice::dca::MAX_FRAME_LEN;

/// File extension of pre-encoded clip files.
pub const CLIP_EXTENSION: &str = "dca";

/// One named, pre-encoded audio clip.
///
/// Frames are attached once when the clip is loaded and never change after
/// that. A clip whose file failed to load carries no frames and is skipped
/// by resolution.
#[derive(Debug)]
pub struct Clip {
    name: String,
    source: String,
    delay: Duration,
    frames: Option<Vec<Bytes>>,
}

impl Clip {
    /// Creates a clip that has not been loaded (unplayable).
    pub fn unloaded(name: impl Into<String>, source: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            delay,
            frames: None,
        }
    }

    /// Creates a playable clip from an already decoded frame sequence.
    pub fn with_frames(
        name: impl Into<String>,
        source: impl Into<String>,
        delay: Duration,
        frames: Vec<Bytes>,
    ) -> Self {
        Self {
            frames: Some(frames),
            ..Self::unloaded(name, source, delay)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Pause held after the last frame before the server is considered idle.
    pub fn trailing_delay(&self) -> Duration {
        self.delay
    }

    pub fn is_playable(&self) -> bool {
        self.frames.is_some()
    }

    /// Encoded frames in play order; empty for an unplayable clip.
    pub fn frames(&self) -> &[Bytes] {
        self.frames.as_deref().unwrap_or(&[])
    }
}

/// Named grouping of clips addressed by a top-level trigger.
#[derive(Debug)]
pub struct ClipSet {
    name: String,
    clips: Vec<Arc<Clip>>,
}

impl ClipSet {
    pub fn new(name: impl Into<String>, clips: Vec<Clip>) -> Self {
        Self {
            name: name.into(),
            clips: clips.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clips(&self) -> &[Arc<Clip>] {
        &self.clips
    }
}

/// All clip sets known to the bot plus the process-wide random source used
/// for unspecified selections.
pub struct ClipCatalog {
    sets: Vec<ClipSet>,
    rng: Mutex<StdRng>,
}

impl ClipCatalog {
    /// Builds a catalog whose random source is seeded once from entropy.
    pub fn new(sets: Vec<ClipSet>) -> Self {
        Self {
            sets,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Builds a catalog with a fixed seed, for reproducible selection.
    pub fn with_seed(sets: Vec<ClipSet>, seed: u64) -> Self {
        Self {
            sets,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Loads every clip named by the manifest from `sound_dir`.
    ///
    /// A clip whose file is missing or corrupt is logged and kept as
    /// unplayable; it never fails the catalog.
    pub async fn load(manifest: &CatalogManifest, sound_dir: &Path) -> Result<Self> {
        manifest.validate()?;

        let mut sets = Vec::with_capacity(manifest.sets.len());
        let mut failed = 0usize;

        for set in &manifest.sets {
            let mut clips = Vec::with_capacity(set.clips.len());

            for entry in &set.clips {
                let path = entry.path_in(sound_dir);
                let delay = Duration::from_millis(entry.delay_ms);

                let loaded = load_clip_file(&path)
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(fit_for_voice);

                let clip = match loaded {
                    Ok(frames) => {
                        debug!("🔈 {} {} loaded ({} frames)", set.name, entry.name, frames.len());
                        Clip::with_frames(&entry.name, &entry.source, delay, frames)
                    }
                    Err(e) => {
                        warn!(
                            "⚠️ Clip {} {} ({}) is unplayable: {}",
                            set.name, entry.name, entry.source, e
                        );
                        failed += 1;
                        Clip::unloaded(&entry.name, &entry.source, delay)
                    }
                };
                clips.push(clip);
            }

            sets.push(ClipSet::new(&set.name, clips));
        }

        info!(
            "🎶 {} clip sets loaded ({} clips unplayable)",
            sets.len(),
            failed
        );

        Ok(Self::new(sets))
    }

    /// Finds the set whose name matches `trigger` exactly.
    pub fn resolve_set(&self, trigger: &str) -> Option<&ClipSet> {
        self.sets.iter().find(|set| set.name == trigger)
    }

    /// Picks a clip from `set`.
    ///
    /// With a token, the clip whose name matches exactly; an unknown or
    /// unplayable clip resolves to nothing. Without a token, a uniformly
    /// random playable member.
    pub fn resolve_clip(&self, set: &ClipSet, token: Option<&str>) -> Option<Arc<Clip>> {
        if let Some(token) = token {
            let clip = set.clips.iter().find(|clip| clip.name == token)?;
            if !clip.is_playable() {
                debug!("Clip {} {} requested but not loaded", set.name, token);
                return None;
            }
            return Some(clip.clone());
        }

        let playable: Vec<&Arc<Clip>> = set.clips.iter().filter(|c| c.is_playable()).collect();
        match playable.len() {
            0 => None,
            1 => Some(playable[0].clone()),
            n => {
                let index = self.rng.lock().gen_range(0..n);
                Some(playable[index].clone())
            }
        }
    }
}

/// On-disk description of the clip sets, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogManifest {
    pub sets: Vec<SetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetEntry {
    pub name: String,
    pub clips: Vec<ClipEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipEntry {
    pub name: String,
    /// File stem under the sound directory.
    pub source: String,
    #[serde(default)]
    pub delay_ms: u64,
}

impl ClipEntry {
    fn path_in(&self, sound_dir: &Path) -> PathBuf {
        sound_dir.join(format!("{}.{}", self.source, CLIP_EXTENSION))
    }
}

impl CatalogManifest {
    /// The sets shipped with the bot when no manifest file is configured.
    pub fn builtin() -> Self {
        let single = |set: &str, source: &str| SetEntry {
            name: set.to_string(),
            clips: vec![ClipEntry {
                name: "Classic".to_string(),
                source: source.to_string(),
                delay_ms: 16,
            }],
        };

        Self {
            sets: vec![single("!Wrong", "DonaldTrumpWrongSound"), single("!Wow", "Wow!")],
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read clip manifest {}", path.display()))?;

        let manifest: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid clip manifest {}", path.display()))?;
        manifest.validate()?;

        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();

        for set in &self.sets {
            if !names.insert(set.name.as_str()) {
                anyhow::bail!("Clip set {} is defined more than once", set.name);
            }
            if set.clips.is_empty() {
                anyhow::bail!("Clip set {} has no clips", set.name);
            }
        }

        Ok(())
    }
}

/// Frames must fit a voice stream record, or the stream would end early.
fn fit_for_voice(frames: Vec<Bytes>) -> Result<Vec<Bytes>> {
    if let Some((index, frame)) = frames
        .iter()
        .enumerate()
        .find(|(_, frame)| frame.len() > MAX_FRAME_LEN)
    {
        anyhow::bail!(
            "frame {} is {} bytes, voice streams carry at most {}",
            index,
            frame.len(),
            MAX_FRAME_LEN
        );
    }

    Ok(frames)
}
