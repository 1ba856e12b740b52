//! # Bot Module
//!
//! Discord gateway side of the soundboard.
//!
//! [`SoundboardBot`] implements Serenity's [`EventHandler`]: it turns chat
//! triggers into play requests for the [`PlaybackEngine`] and answers the
//! fixed text commands. Everything voice-related happens in the engine.

use serenity::{
    all::{
        ActivityData, ChannelId, Context, EventHandler, Guild, GuildId, Message, Ready, User, UserId,
    },
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod triggers;

use crate::{
    audio::{catalog::ClipCatalog, engine::PlaybackEngine, SubmitOutcome},
    config::Config,
};
use triggers::Trigger;

const INTRO_MESSAGE: &str = "Soundboard is ready. You asked for this.";
const QUEUE_FULL_MESSAGE: &str = "🚫 Too many clips queued here, try again in a moment.";

/// Gateway event handler.
pub struct SoundboardBot {
    config: Arc<Config>,
    catalog: Arc<ClipCatalog>,
    engine: PlaybackEngine,
}

impl SoundboardBot {
    pub fn new(config: Arc<Config>, catalog: Arc<ClipCatalog>, engine: PlaybackEngine) -> Self {
        Self {
            config,
            catalog,
            engine,
        }
    }

    async fn handle_play(&self, ctx: &Context, msg: &Message, set: &str, clip: Option<&str>) {
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let Some(channel_id) = user_voice_channel(ctx, guild_id, msg.author.id) else {
            debug!("{} is not in a voice channel in guild {}", msg.author.name, guild_id);
            return;
        };

        let Some(request) =
            triggers::build_request(&self.catalog, set, clip, guild_id, channel_id, msg.author.id)
        else {
            return;
        };

        let outcome = self.engine.submit(request);
        debug!("{} from {} in guild {}: {:?}", set, msg.author.name, guild_id, outcome);

        if outcome == SubmitOutcome::Dropped && self.config.notify_queue_full {
            if let Err(e) = msg.reply(&ctx.http, QUEUE_FULL_MESSAGE).await {
                warn!("Could not send queue notice: {:?}", e);
            }
        }
    }
}

/// Only the bot's own messages are ignored; other bots may trigger clips.
fn is_own_message(author: &User, current_user_id: UserId) -> bool {
    author.id == current_user_id
}

/// Voice channel `user_id` currently sits in, according to the cache.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user_id)?.channel_id
}

#[async_trait]
impl EventHandler for SoundboardBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        ctx.set_activity(Some(ActivityData::playing(self.config.status_text.clone())));
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new != Some(true) {
            return;
        }

        info!("🏠 Joined guild {} ({})", guild.name, guild.id);
        if let Some(channel_id) = guild.system_channel_id {
            if let Err(e) = channel_id.say(&ctx.http, INTRO_MESSAGE).await {
                warn!("Could not greet guild {}: {:?}", guild.id, e);
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let current_user_id = ctx.cache.current_user().id;
        if is_own_message(&msg.author, current_user_id) {
            return;
        }

        let Some(trigger) = Trigger::parse(&msg.content) else {
            return;
        };

        match trigger {
            Trigger::Reply(text) => {
                if let Err(e) = msg.channel_id.say(&ctx.http, text).await {
                    warn!("Could not reply to {}: {:?}", msg.author.name, e);
                }
            }
            Trigger::Play { set, clip } => self.handle_play(&ctx, &msg, set, clip).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(id: u64, bot: bool) -> User {
        let mut user = User::default();
        user.id = UserId::new(id);
        user.bot = bot;
        user
    }

    #[test]
    fn only_own_messages_are_ignored() {
        let me = UserId::new(99);

        assert!(is_own_message(&author(99, true), me));
        assert!(!is_own_message(&author(42, true), me));
        assert!(!is_own_message(&author(7, false), me));
    }
}
