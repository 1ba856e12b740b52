use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tracing::debug;

use super::catalog::Clip;

/// Default number of requests a server may have waiting behind the one
/// being played.
pub const DEFAULT_QUEUE_CAPACITY: usize = 6;

/// A single request to play a clip in a voice channel.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub requested_by: UserId,
    pub clip: Arc<Clip>,
    pub requested_at: DateTime<Utc>,
}

impl PlayRequest {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, requested_by: UserId, clip: Arc<Clip>) -> Self {
        Self {
            guild_id,
            channel_id,
            requested_by,
            clip,
            requested_at: Utc::now(),
        }
    }
}

/// Result of offering a request to the registry.
#[derive(Debug)]
pub enum Admission {
    /// No playback was active: the caller owns the new queue entry and must
    /// start a worker with this request.
    Dispatch(PlayRequest),
    /// Appended behind the active playback at this 1-based position.
    Queued { position: usize },
    /// The server's queue is at capacity.
    Full(PlayRequest),
    /// The registry no longer accepts work (shutdown).
    Closed(PlayRequest),
}

#[derive(Debug, Default)]
struct RegistryState {
    queues: HashMap<GuildId, VecDeque<PlayRequest>>,
    closed: bool,
}

/// Per-server bounded FIFO queues behind a single lock.
///
/// An entry exists for a server exactly while a worker owns it; the lock
/// makes "is anyone playing here?" and "create the entry" one step, so two
/// triggers racing on an idle server cannot both start a worker.
#[derive(Debug)]
pub struct QueueRegistry {
    state: Mutex<RegistryState>,
    capacity: usize,
}

impl QueueRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Atomic get-or-create: either claims the server for a new worker or
    /// appends to the existing queue. Never blocks on queue space.
    pub fn admit(&self, request: PlayRequest) -> Admission {
        let mut state = self.state.lock();

        if state.closed {
            return Admission::Closed(request);
        }

        match state.queues.get_mut(&request.guild_id) {
            Some(pending) if pending.len() >= self.capacity => Admission::Full(request),
            Some(pending) => {
                pending.push_back(request);
                Admission::Queued {
                    position: pending.len(),
                }
            }
            None => {
                state.queues.insert(request.guild_id, VecDeque::with_capacity(self.capacity));
                Admission::Dispatch(request)
            }
        }
    }

    /// Takes the oldest waiting request for `guild_id`.
    pub fn next(&self, guild_id: GuildId) -> Option<PlayRequest> {
        self.state.lock().queues.get_mut(&guild_id)?.pop_front()
    }

    pub fn has_pending(&self, guild_id: GuildId) -> bool {
        self.pending_len(guild_id).is_some_and(|len| len > 0)
    }

    /// Number of requests waiting, or `None` if the server is idle.
    pub fn pending_len(&self, guild_id: GuildId) -> Option<usize> {
        self.state.lock().queues.get(&guild_id).map(VecDeque::len)
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.state.lock().queues.contains_key(&guild_id)
    }

    pub fn active_servers(&self) -> usize {
        self.state.lock().queues.len()
    }

    /// Removes the entry only if nothing is waiting. Returns `true` when the
    /// server is idle afterwards.
    pub fn release_if_idle(&self, guild_id: GuildId) -> bool {
        let mut state = self.state.lock();
        match state.queues.get(&guild_id) {
            Some(pending) if !pending.is_empty() => false,
            _ => {
                state.queues.remove(&guild_id);
                true
            }
        }
    }

    /// Removes the entry unconditionally, returning how many waiting
    /// requests were discarded with it.
    pub fn abandon(&self, guild_id: GuildId) -> usize {
        let abandoned = self
            .state
            .lock()
            .queues
            .remove(&guild_id)
            .map_or(0, |pending| pending.len());

        if abandoned > 0 {
            debug!("🗑️ {} waiting requests dropped for guild {}", abandoned, guild_id);
        }
        abandoned
    }

    /// Stops accepting new requests. Existing entries stay until their
    /// workers remove them.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}
