//! In-memory port implementations shared by the engine tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, PeerId, PostRef},
    errors::{ProviderError, ProviderResult},
    messaging::{
        port::MessagingProvider,
        types::{ChannelInfo, Post},
    },
    ports::{ChannelValidator, ContentGenerator, DiscoverySource},
};

pub fn ch(name: &str) -> ChannelId {
    ChannelId::parse(name).unwrap()
}

pub fn posts(texts: &[&str]) -> Vec<Post> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Post {
            id: 100 - i as i32,
            text: Some(t.to_string()),
        })
        .collect()
}

pub fn broadcast(peer: i64, linked: Option<i64>) -> ChannelInfo {
    ChannelInfo {
        peer: PeerId(peer),
        title: format!("channel {peer}"),
        broadcast: true,
        left: true,
        linked_chat_id: linked.map(PeerId),
    }
}

#[derive(Default)]
pub struct FakeProvider {
    channels: Mutex<HashMap<String, ChannelInfo>>,
    groups: Mutex<HashMap<i64, ChannelInfo>>,
    posts: Mutex<HashMap<i64, Vec<Post>>>,
    send_failures: Mutex<VecDeque<ProviderError>>,
    fail_join: Mutex<HashSet<i64>>,
    pub sent: Mutex<Vec<(PeerId, String, i32)>>,
    pub reactions: Mutex<Vec<(PostRef, String)>>,
    pub joined: Mutex<Vec<PeerId>>,
    pub left: Mutex<Vec<PeerId>>,
    pub send_attempts: AtomicUsize,
}

impl FakeProvider {
    pub fn with_channel(self, id: &str, info: ChannelInfo, posts: Vec<Post>) -> Self {
        self.posts.lock().unwrap().insert(info.peer.0, posts);
        self.channels
            .lock()
            .unwrap()
            .insert(ch(id).as_str().to_string(), info);
        self
    }

    pub fn with_group(self, info: ChannelInfo) -> Self {
        self.groups.lock().unwrap().insert(info.peer.0, info);
        self
    }

    pub fn failing_join(self, peer: i64) -> Self {
        self.fail_join.lock().unwrap().insert(peer);
        self
    }

    /// The next sends fail with these errors, in order.
    pub fn failing_sends(self, errors: Vec<ProviderError>) -> Self {
        *self.send_failures.lock().unwrap() = errors.into();
        self
    }

    pub fn sent(&self) -> Vec<(PeerId, String, i32)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingProvider for FakeProvider {
    async fn resolve(&self, channel: &ChannelId) -> ProviderResult<ChannelInfo> {
        self.channels
            .lock()
            .unwrap()
            .get(channel.as_str())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(channel.to_string()))
    }

    async fn join(&self, peer: PeerId) -> ProviderResult<()> {
        if self.fail_join.lock().unwrap().contains(&peer.0) {
            return Err(ProviderError::PermissionDenied("join".into()));
        }
        self.joined.lock().unwrap().push(peer);
        Ok(())
    }

    async fn leave(&self, peer: PeerId) -> ProviderResult<()> {
        self.left.lock().unwrap().push(peer);
        Ok(())
    }

    async fn recent_posts(&self, peer: PeerId, limit: usize) -> ProviderResult<Vec<Post>> {
        let all = self.posts.lock().unwrap().get(&peer.0).cloned();
        Ok(all.unwrap_or_default().into_iter().take(limit).collect())
    }

    async fn linked_discussion_group(
        &self,
        channel: &ChannelInfo,
    ) -> ProviderResult<Option<ChannelInfo>> {
        let Some(linked) = channel.linked_chat_id else {
            return Ok(None);
        };
        Ok(self.groups.lock().unwrap().get(&linked.0).cloned())
    }

    async fn send_message(&self, peer: PeerId, text: &str, reply_to: i32) -> ProviderResult<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.send_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.sent
            .lock()
            .unwrap()
            .push((peer, text.to_string(), reply_to));
        Ok(())
    }

    async fn send_reaction(&self, post: PostRef, emoji: &str) -> ProviderResult<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((post, emoji.to_string()));
        Ok(())
    }
}

/// Discovery source answering from a fixed table; unknown pairs return nothing.
#[derive(Default)]
pub struct FakeSource {
    results: Mutex<HashMap<(String, String), Vec<ChannelId>>>,
    unavailable_for: AtomicUsize,
    failures: Mutex<HashMap<(String, String), ProviderError>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeSource {
    pub fn with(self, topic: &str, keyword: &str, found: &[&str]) -> Self {
        self.results.lock().unwrap().insert(
            (topic.to_string(), keyword.to_string()),
            found.iter().map(|s| ch(s)).collect(),
        );
        self
    }

    /// The first `n` searches fail with a transport error.
    pub fn unavailable(self, n: usize) -> Self {
        self.unavailable_for.store(n, Ordering::SeqCst);
        self
    }

    /// Every search for this pair fails with `error`.
    pub fn failing(self, topic: &str, keyword: &str, error: ProviderError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((topic.to_string(), keyword.to_string()), error);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiscoverySource for FakeSource {
    async fn search(&self, topic: &str, keyword: &str) -> ProviderResult<Vec<ChannelId>> {
        self.calls
            .lock()
            .unwrap()
            .push((topic.to_string(), keyword.to_string()));
        if self.unavailable_for.load(Ordering::SeqCst) > 0 {
            self.unavailable_for.fetch_sub(1, Ordering::SeqCst);
            return Err(ProviderError::transport("scraper offline"));
        }
        let key = (topic.to_string(), keyword.to_string());
        if let Some(e) = self.failures.lock().unwrap().get(&key).cloned() {
            return Err(e);
        }
        let found = self
            .results
            .lock()
            .unwrap()
            .get(&key)
            .cloned();
        Ok(found.unwrap_or_default())
    }
}

/// Accepts every channel except the listed ones.
#[derive(Default)]
pub struct FakeValidator {
    rejected: HashSet<String>,
    pub checked: Mutex<Vec<ChannelId>>,
}

impl FakeValidator {
    pub fn rejecting(names: &[&str]) -> Self {
        Self {
            rejected: names.iter().map(|n| ch(n).as_str().to_string()).collect(),
            checked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChannelValidator for FakeValidator {
    async fn is_engageable(&self, channel: &ChannelId) -> bool {
        self.checked.lock().unwrap().push(channel.clone());
        !self.rejected.contains(channel.as_str())
    }
}

pub struct FakeGenerator;

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, post_text: &str, _topics: &[String]) -> String {
        format!("re: {}", post_text.chars().take(12).collect::<String>())
    }
}
