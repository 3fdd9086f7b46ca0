use serde::{Deserialize, Serialize};

use crate::domain::{PeerId, PostRef};

/// Resolved channel or group as seen by the signed-in account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub peer: PeerId,
    #[serde(default)]
    pub title: String,
    /// Broadcast channel (as opposed to a group / supergroup).
    #[serde(default)]
    pub broadcast: bool,
    /// True when the account is not (or no longer) a member.
    #[serde(default)]
    pub left: bool,
    /// Discussion group linked to a broadcast channel, if any.
    #[serde(default)]
    pub linked_chat_id: Option<PeerId>,
}

impl ChannelInfo {
    pub fn is_member(&self) -> bool {
        !self.left
    }
}

/// A recent post in a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i32,
    #[serde(default)]
    pub text: Option<String>,
}

impl Post {
    pub fn at(&self, peer: PeerId) -> PostRef {
        PostRef {
            peer,
            message_id: self.id,
        }
    }

    /// Posts whose trimmed text is shorter than this are not worth a comment.
    pub const MIN_TEXT_CHARS: usize = 10;

    pub fn engageable_text(&self) -> Option<&str> {
        let text = self.text.as_deref()?;
        if text.trim().chars().count() < Self::MIN_TEXT_CHARS {
            return None;
        }
        Some(text)
    }
}

/// Positive reactions the worker picks from.
pub const POSITIVE_REACTIONS: [&str; 20] = [
    "👍", "❤️", "🔥", "🥰", "👏", "😍", "🤩", "🤝", "💯", "⭐", "🎉", "🙏", "💪", "👌", "✨", "💝",
    "🌟", "🏆", "🚀", "💎",
];
