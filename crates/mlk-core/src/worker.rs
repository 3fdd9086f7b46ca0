//! Engagement worker: join, comment and react on recent posts, leave, record.
//!
//! One channel at a time, in queue order. Every provider failure is contained
//! at the smallest enclosing action; only store failures reach the main loop.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChannelId, PeerId},
    errors::{ProviderError, ProviderResult},
    messaging::{
        port::MessagingProvider,
        types::{ChannelInfo, Post, POSITIVE_REACTIONS},
    },
    pacing::{random_count, random_secs, sleep_or_cancel},
    ports::ContentGenerator,
    processed::ProcessedRegistry,
    queue::EngagementQueue,
    retry::{retry_action, ActionError},
    settings::{Settings, Timings},
    stats::StatsTracker,
    store::StateStore,
    Result,
};

/// Transient per-channel state.
#[derive(Debug, Default)]
struct Session {
    posts_target: usize,
    posts_done: usize,
    joined: bool,
}

pub struct EngagementWorker {
    provider: Arc<dyn MessagingProvider>,
    generator: Arc<dyn ContentGenerator>,
    queue: Arc<EngagementQueue>,
    processed: Arc<ProcessedRegistry>,
    stats: Arc<StatsTracker>,
    store: StateStore,
    timings: Timings,
}

impl EngagementWorker {
    pub fn new(
        provider: Arc<dyn MessagingProvider>,
        generator: Arc<dyn ContentGenerator>,
        queue: Arc<EngagementQueue>,
        processed: Arc<ProcessedRegistry>,
        stats: Arc<StatsTracker>,
        store: StateStore,
        timings: Timings,
    ) -> Self {
        Self {
            provider,
            generator,
            queue,
            processed,
            stats,
            store,
            timings,
        }
    }

    /// Consume the queue until `cancel` fires.
    pub async fn run(&self, settings: Settings, cancel: CancellationToken) {
        info!(
            max_channels = ?settings.max_channels,
            posts = ?settings.posts_range,
            delay = ?settings.delay_range,
            "engagement worker started"
        );

        while !cancel.is_cancelled() {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.queue.dequeue(self.timings.dequeue_timeout) => next,
            };
            let Some(channel) = next else {
                continue;
            };

            if self.processed.contains(&channel) {
                debug!(channel = %channel, "already processed, skipped");
                continue;
            }
            if settings.cap_reached(self.processed.len()) {
                info!(
                    channel = %channel,
                    processed = self.processed.len(),
                    "channel cap reached, dropping dequeued channel"
                );
                sleep_or_cancel(&cancel, self.timings.cap_wait).await;
                continue;
            }

            match self.process(&channel, &settings, &cancel).await {
                Ok(true) => info!(channel = %channel, "channel processed"),
                Ok(false) => debug!(channel = %channel, "channel dropped"),
                Err(e) => {
                    error!(channel = %channel, error = %e, "engagement loop error");
                    self.stats.error();
                    self.stats.persist(&self.store);
                    sleep_or_cancel(&cancel, self.timings.loop_error_backoff).await;
                    continue;
                }
            }
            self.stats.persist(&self.store);

            if !settings.delay_range.is_zero() {
                sleep_or_cancel(&cancel, random_secs(settings.delay_range)).await;
            }
        }

        info!("engagement worker stopped");
    }

    /// Engage one channel. `Ok(true)` once it is recorded as processed.
    ///
    /// Resolution failures and mid-channel provider errors return `Ok(false)`
    /// and leave the channel unrecorded; only a failed record write is an `Err`.
    pub async fn process(
        &self,
        channel: &ChannelId,
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let info = match self.provider.resolve(channel).await {
            Ok(info) => info,
            Err(e) => {
                warn!(channel = %channel, error = %e, "cannot resolve channel");
                return Ok(false);
            }
        };

        let mut session = Session::default();
        if let Err(e) = self.engage(channel, &info, settings, &mut session, cancel).await {
            warn!(channel = %channel, error = %e, "engagement aborted");
            self.stats.error();
            if session.joined {
                self.leave(channel, info.peer).await;
            }
            return Ok(false);
        }

        self.leave(channel, info.peer).await;

        self.processed.record(channel)?;
        self.stats.channel_processed();
        info!(
            channel = %channel,
            posts = session.posts_done,
            target = session.posts_target,
            "channel engaged"
        );
        Ok(true)
    }

    async fn engage(
        &self,
        channel: &ChannelId,
        info: &ChannelInfo,
        settings: &Settings,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> ProviderResult<()> {
        if info.is_member() {
            session.joined = true;
        } else {
            match self.provider.join(info.peer).await {
                Ok(()) => {
                    session.joined = true;
                    debug!(channel = %channel, "joined");
                    sleep_or_cancel(cancel, random_secs(self.timings.join_delay)).await;
                }
                Err(e) => warn!(channel = %channel, error = %e, "join failed, continuing"),
            }
        }

        session.posts_target = random_count(settings.posts_range) as usize;
        let candidates = self
            .provider
            .recent_posts(info.peer, session.posts_target * 2)
            .await?;

        for post in &candidates {
            if session.posts_done >= session.posts_target || cancel.is_cancelled() {
                break;
            }
            let Some(text) = post.engageable_text() else {
                continue;
            };

            self.engage_post(info, post, text, settings, cancel).await;
            session.posts_done += 1;

            if !settings.delay_range.is_zero()
                && !sleep_or_cancel(cancel, random_secs(settings.delay_range)).await
            {
                break;
            }
        }
        Ok(())
    }

    /// Comment, then react regardless of the comment outcome.
    async fn engage_post(
        &self,
        info: &ChannelInfo,
        post: &Post,
        text: &str,
        settings: &Settings,
        cancel: &CancellationToken,
    ) {
        let comment = self.generator.generate(text, &settings.topics).await;

        if self.send_comment(info, post.id, &comment, cancel).await {
            self.stats.comment_sent();
            sleep_or_cancel(cancel, random_secs(self.timings.reaction_delay)).await;
        } else {
            self.stats.error();
        }

        if self.set_reaction(info, post, cancel).await {
            self.stats.reaction_set();
        } else {
            self.stats.error();
        }
    }

    pub(crate) async fn send_comment(
        &self,
        info: &ChannelInfo,
        post_id: i32,
        comment: &str,
        cancel: &CancellationToken,
    ) -> bool {
        retry_action("comment", &self.timings, cancel, move || {
            self.try_comment(info, post_id, comment)
        })
        .await
    }

    async fn try_comment(
        &self,
        info: &ChannelInfo,
        post_id: i32,
        comment: &str,
    ) -> std::result::Result<(), ActionError> {
        let target = self.reply_target(info).await?;
        self.provider.send_message(target, comment, post_id).await?;
        debug!(peer = target.0, post_id, "comment sent");
        Ok(())
    }

    /// Where replies to `info`'s posts go: its discussion group when it has one
    /// (joined on demand), the channel itself otherwise.
    async fn reply_target(&self, info: &ChannelInfo) -> std::result::Result<PeerId, ActionError> {
        if info.linked_chat_id.is_none() {
            return Ok(info.peer);
        }
        let Some(group) = self.provider.linked_discussion_group(info).await? else {
            return Ok(info.peer);
        };
        if group.left {
            self.provider.join(group.peer).await.map_err(|e| {
                ActionError::Abort(format!("cannot join discussion group: {e}"))
            })?;
            tokio::time::sleep(self.timings.discussion_join_delay).await;
        }
        Ok(group.peer)
    }

    async fn set_reaction(&self, info: &ChannelInfo, post: &Post, cancel: &CancellationToken) -> bool {
        let emoji = POSITIVE_REACTIONS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(POSITIVE_REACTIONS[0]);
        let target = post.at(info.peer);
        retry_action("reaction", &self.timings, cancel, move || async move {
            self.provider
                .send_reaction(target, emoji)
                .await
                .map_err(ActionError::from)
        })
        .await
    }

    async fn leave(&self, channel: &ChannelId, peer: PeerId) {
        match self.provider.leave(peer).await {
            Ok(()) => debug!(channel = %channel, "left"),
            Err(ProviderError::NotFound(_)) => {}
            Err(e) => warn!(channel = %channel, error = %e, "leave failed"),
        }
    }
}
