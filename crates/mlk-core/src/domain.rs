use std::fmt;

use serde::{Deserialize, Serialize};

/// Public channel identifier, always in `@username` form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Normalize a username, `@username`, `t.me/username` or `.../channel/@username` link.
    ///
    /// Returns `None` when nothing usable remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut s = raw.trim();
        if let Some(idx) = s.find("/channel/") {
            s = &s[idx + "/channel/".len()..];
        } else if let Some(idx) = s.find("t.me/") {
            s = &s[idx + "t.me/".len()..];
        }
        let s = s.split(['/', '?', '#']).next().unwrap_or("");
        let name = s.trim_start_matches('@');
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return None;
        }
        Some(Self(format!("@{name}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric peer id as returned by the messaging provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub i64);

/// A specific post inside a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PostRef {
    pub peer: PeerId,
    pub message_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_usernames_and_links() {
        let want = Some("@rust_news".to_string());
        assert_eq!(ChannelId::parse("rust_news").map(|c| c.0), want);
        assert_eq!(ChannelId::parse(" @rust_news ").map(|c| c.0), want);
        assert_eq!(ChannelId::parse("https://t.me/rust_news").map(|c| c.0), want);
        assert_eq!(
            ChannelId::parse("https://tgstat.ru/channel/@rust_news/stat").map(|c| c.0),
            want
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(ChannelId::parse("").is_none());
        assert!(ChannelId::parse("@").is_none());
        assert!(ChannelId::parse("not a name").is_none());
    }
}
