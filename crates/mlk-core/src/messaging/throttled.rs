use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelId, PeerId, PostRef},
    errors::ProviderResult,
    messaging::{
        port::MessagingProvider,
        types::{ChannelInfo, Post},
    },
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* provider calls (account-wide flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between writes into the same peer.
    pub per_peer_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(1000),
            per_peer_min_interval: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingProvider decorator that spaces outbound calls.
///
/// Best-effort: it lowers the odds of `RateLimited` answers, the worker still
/// honours provider-mandated waits.
pub struct ThrottledProvider {
    inner: Arc<dyn MessagingProvider>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_peer: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledProvider {
    pub fn new(inner: Arc<dyn MessagingProvider>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_peer: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_peer(&self, peer: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_peer.lock().await;
        map.entry(peer)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_peer_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_peer(&self, peer: PeerId) {
        let global_wait = { self.global.lock().await.reserve() };
        let peer_wait = {
            let lim = self.limiter_for_peer(peer.0).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(peer_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingProvider for ThrottledProvider {
    async fn resolve(&self, channel: &ChannelId) -> ProviderResult<ChannelInfo> {
        self.throttle_global().await;
        self.inner.resolve(channel).await
    }

    async fn join(&self, peer: PeerId) -> ProviderResult<()> {
        self.throttle_global().await;
        self.inner.join(peer).await
    }

    async fn leave(&self, peer: PeerId) -> ProviderResult<()> {
        self.throttle_global().await;
        self.inner.leave(peer).await
    }

    async fn recent_posts(&self, peer: PeerId, limit: usize) -> ProviderResult<Vec<Post>> {
        self.throttle_global().await;
        self.inner.recent_posts(peer, limit).await
    }

    async fn linked_discussion_group(
        &self,
        channel: &ChannelInfo,
    ) -> ProviderResult<Option<ChannelInfo>> {
        self.throttle_global().await;
        self.inner.linked_discussion_group(channel).await
    }

    async fn send_message(&self, peer: PeerId, text: &str, reply_to: i32) -> ProviderResult<()> {
        self.throttle_peer(peer).await;
        self.inner.send_message(peer, text, reply_to).await
    }

    async fn send_reaction(&self, post: PostRef, emoji: &str) -> ProviderResult<()> {
        self.throttle_peer(post.peer).await;
        self.inner.send_reaction(post, emoji).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_secs(2));
        assert_eq!(lim.reserve(), Duration::ZERO);
        assert_eq!(lim.reserve(), Duration::from_secs(2));
        assert_eq!(lim.reserve(), Duration::from_secs(4));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(lim.reserve(), Duration::ZERO);
    }
}
