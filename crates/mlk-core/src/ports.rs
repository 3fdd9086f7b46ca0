//! Collaborator ports the pipeline depends on.
//!
//! The messaging client lives in [`crate::messaging::port`]; these are the
//! remaining outside collaborators: the discovery source, the eligibility
//! check and the comment generator.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::{
    domain::ChannelId,
    errors::{ProviderError, ProviderResult},
    messaging::port::MessagingProvider,
};

/// Search backend that turns a (topic, keyword) pair into channel identifiers.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// `Err(ProviderError::Transport)` means the backend itself is unavailable.
    async fn search(&self, topic: &str, keyword: &str) -> ProviderResult<Vec<ChannelId>>;
}

/// Decides whether a discovered channel can receive comments at all.
#[async_trait]
pub trait ChannelValidator: Send + Sync {
    async fn is_engageable(&self, channel: &ChannelId) -> bool;
}

/// Produces a comment for a post. Never fails: implementations fall back to
/// [`fallback_comment`].
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, post_text: &str, topics: &[String]) -> String;
}

pub const FALLBACK_COMMENTS: [&str; 5] = [
    "Interesting, thanks for the post!",
    "Useful information",
    "Timely topic",
    "Good material",
    "Agree with the author",
];

pub fn fallback_comment() -> String {
    FALLBACK_COMMENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_COMMENTS[0])
        .to_string()
}

/// Generator that only ever returns fallback comments (no model configured).
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackGenerator;

#[async_trait]
impl ContentGenerator for FallbackGenerator {
    async fn generate(&self, _post_text: &str, _topics: &[String]) -> String {
        fallback_comment()
    }
}

/// Eligibility check backed by the messaging provider.
///
/// Broadcast channels qualify only through a linked discussion group the account
/// has not left; groups qualify directly.
pub struct ProviderValidator {
    provider: Arc<dyn MessagingProvider>,
}

impl ProviderValidator {
    pub fn new(provider: Arc<dyn MessagingProvider>) -> Self {
        Self { provider }
    }

    async fn check(&self, channel: &ChannelId) -> ProviderResult<bool> {
        let info = self.provider.resolve(channel).await?;
        if !info.broadcast {
            return Ok(true);
        }
        if info.linked_chat_id.is_none() {
            return Ok(false);
        }
        match self.provider.linked_discussion_group(&info).await? {
            Some(group) => Ok(!group.left),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ChannelValidator for ProviderValidator {
    async fn is_engageable(&self, channel: &ChannelId) -> bool {
        match self.check(channel).await {
            Ok(ok) => {
                debug!(channel = %channel, engageable = ok, "channel checked");
                ok
            }
            Err(e @ (ProviderError::NotFound(_) | ProviderError::PermissionDenied(_))) => {
                warn!(channel = %channel, error = %e, "channel unavailable");
                false
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "channel check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{broadcast, ch, FakeProvider};

    fn validator(provider: FakeProvider) -> ProviderValidator {
        ProviderValidator::new(Arc::new(provider))
    }

    #[tokio::test]
    async fn broadcast_needs_an_open_discussion_group() {
        let mut barred = broadcast(31, None);
        barred.broadcast = false;
        barred.left = true;

        let provider = FakeProvider::default()
            .with_channel("open", broadcast(1, Some(30)), vec![])
            .with_channel("barred", broadcast(2, Some(31)), vec![])
            .with_channel("silent", broadcast(3, None), vec![])
            .with_group({
                let mut g = broadcast(30, None);
                g.broadcast = false;
                g.left = false;
                g
            })
            .with_group(barred);
        let v = validator(provider);

        assert!(v.is_engageable(&ch("open")).await);
        assert!(!v.is_engageable(&ch("barred")).await);
        assert!(!v.is_engageable(&ch("silent")).await);
        assert!(!v.is_engageable(&ch("missing")).await);
    }

    #[tokio::test]
    async fn groups_qualify_directly() {
        let mut group = broadcast(5, None);
        group.broadcast = false;
        let v = validator(FakeProvider::default().with_channel("chat", group, vec![]));
        assert!(v.is_engageable(&ch("chat")).await);
    }

    #[tokio::test]
    async fn fallback_generator_uses_the_fixed_set() {
        let text = FallbackGenerator.generate("anything", &[]).await;
        assert!(FALLBACK_COMMENTS.contains(&text.as_str()));
    }
}
