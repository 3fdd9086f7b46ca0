use async_trait::async_trait;

use crate::{
    domain::{ChannelId, PeerId, PostRef},
    errors::ProviderResult,
    messaging::types::{ChannelInfo, Post},
};

/// User-account messaging client the worker drives.
///
/// Every call is a single remote round trip; implementations map their transport
/// failures into the closed [`crate::ProviderError`] taxonomy.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn resolve(&self, channel: &ChannelId) -> ProviderResult<ChannelInfo>;

    async fn join(&self, peer: PeerId) -> ProviderResult<()>;
    async fn leave(&self, peer: PeerId) -> ProviderResult<()>;

    /// Most recent posts, newest first.
    async fn recent_posts(&self, peer: PeerId, limit: usize) -> ProviderResult<Vec<Post>>;

    /// Resolve the discussion group linked to `channel`, if the channel has one.
    async fn linked_discussion_group(
        &self,
        channel: &ChannelInfo,
    ) -> ProviderResult<Option<ChannelInfo>>;

    /// Send `text` into `peer` as a reply to message `reply_to`.
    async fn send_message(&self, peer: PeerId, text: &str, reply_to: i32) -> ProviderResult<()>;

    async fn send_reaction(&self, post: PostRef, emoji: &str) -> ProviderResult<()>;
}
