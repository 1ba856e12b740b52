use serenity::model::id::{ChannelId, GuildId, UserId};

use crate::audio::{catalog::ClipCatalog, queue::PlayRequest};

/// Fixed text replies, matched against the whole message.
const REPLIES: &[(&str, &str)] = &[("!Ping", "Pong!"), ("!Pong", "Ping!")];

/// A chat message recognised as a bot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger<'a> {
    Reply(&'static str),
    /// `<set>` plays a random clip of the set, `<set> <clip>` a specific one.
    Play { set: &'a str, clip: Option<&'a str> },
}

impl<'a> Trigger<'a> {
    /// Recognises messages starting with `!`. Whether a `Play` names a real
    /// set is decided later against the catalog.
    pub fn parse(content: &'a str) -> Option<Self> {
        if !content.starts_with('!') {
            return None;
        }

        if let Some((_, reply)) = REPLIES.iter().find(|(trigger, _)| *trigger == content) {
            return Some(Trigger::Reply(*reply));
        }

        // Single spaces only: a doubled space yields an empty clip name,
        // which matches nothing.
        let mut parts = content.split(' ');
        let set = parts.next()?;
        Some(Trigger::Play {
            set,
            clip: parts.next(),
        })
    }
}

/// Turns a play trigger into a request, or nothing if the set or clip is
/// unknown.
pub fn build_request(
    catalog: &ClipCatalog,
    set: &str,
    clip: Option<&str>,
    guild_id: GuildId,
    channel_id: ChannelId,
    user_id: UserId,
) -> Option<PlayRequest> {
    let clip_set = catalog.resolve_set(set)?;
    let clip = catalog.resolve_clip(clip_set, clip)?;

    Some(PlayRequest::new(guild_id, channel_id, user_id, clip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::catalog::{Clip, ClipSet};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn replies_match_whole_message() {
        assert_eq!(Trigger::parse("!Ping"), Some(Trigger::Reply("Pong!")));
        assert_eq!(Trigger::parse("!Pong"), Some(Trigger::Reply("Ping!")));
        assert_eq!(
            Trigger::parse("!Ping now"),
            Some(Trigger::Play {
                set: "!Ping",
                clip: Some("now")
            })
        );
    }

    #[test]
    fn ignores_messages_without_prefix() {
        assert_eq!(Trigger::parse(""), None);
        assert_eq!(Trigger::parse("hello !Wow"), None);
    }

    #[test]
    fn splits_set_and_clip() {
        assert_eq!(
            Trigger::parse("!Wow"),
            Some(Trigger::Play { set: "!Wow", clip: None })
        );
        assert_eq!(
            Trigger::parse("!Wow Classic"),
            Some(Trigger::Play {
                set: "!Wow",
                clip: Some("Classic")
            })
        );
    }

    #[test]
    fn doubled_space_names_an_empty_clip() {
        assert_eq!(
            Trigger::parse("!Wow  Classic"),
            Some(Trigger::Play {
                set: "!Wow",
                clip: Some("")
            })
        );
        assert_eq!(
            Trigger::parse("!Wow Classic extra"),
            Some(Trigger::Play {
                set: "!Wow",
                clip: Some("Classic")
            })
        );
    }

    #[test]
    fn unknown_set_or_clip_creates_no_request() {
        let catalog = ClipCatalog::new(vec![ClipSet::new(
            "!Wow",
            vec![Clip::with_frames(
                "Classic",
                "Wow!",
                Duration::from_millis(16),
                vec![Bytes::from_static(b"f")],
            )],
        )]);
        let ids = (GuildId::new(1), ChannelId::new(2), UserId::new(3));

        assert!(build_request(&catalog, "!Nope", None, ids.0, ids.1, ids.2).is_none());
        assert!(build_request(&catalog, "!Wow", Some("Remix"), ids.0, ids.1, ids.2).is_none());
        assert!(build_request(&catalog, "!Wow", Some(""), ids.0, ids.1, ids.2).is_none());

        let request = build_request(&catalog, "!Wow", Some("Classic"), ids.0, ids.1, ids.2).unwrap();
        assert_eq!(request.clip.name(), "Classic");
        assert_eq!(request.channel_id, ChannelId::new(2));
    }
}
