//! Discovery coordinator: walks topic × keyword, validates what the source
//! returns and feeds the engagement queue.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cursor::{Progress, SearchCursor},
    domain::ChannelId,
    errors::ProviderError,
    pacing::{random_secs, sleep_or_cancel},
    ports::{ChannelValidator, DiscoverySource},
    queue::EngagementQueue,
    settings::{Settings, Timings},
    store::{StateStore, KEY_SEARCH_STATE},
    Result,
};

pub struct DiscoveryCoordinator {
    store: StateStore,
    source: Arc<dyn DiscoverySource>,
    validator: Arc<dyn ChannelValidator>,
    queue: Arc<EngagementQueue>,
    timings: Timings,
    /// Copy of the live cursor for progress readers.
    latest: Mutex<Option<SearchCursor>>,
    active: AtomicBool,
}

impl DiscoveryCoordinator {
    pub fn new(
        store: StateStore,
        source: Arc<dyn DiscoverySource>,
        validator: Arc<dyn ChannelValidator>,
        queue: Arc<EngagementQueue>,
        timings: Timings,
    ) -> Self {
        Self {
            store,
            source,
            validator,
            queue,
            timings,
            latest: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Progress of the running cycle, or of the last persisted one when idle.
    pub fn progress(&self) -> Progress {
        let live = self.latest.lock().ok().and_then(|c| c.clone());
        let cursor = match live {
            Some(c) => Some(c),
            None => self.store.load_state::<SearchCursor>(KEY_SEARCH_STATE).ok().flatten(),
        };
        cursor
            .map(|c| c.progress(self.is_active()))
            .unwrap_or_default()
    }

    /// Run until `cancel` fires.
    ///
    /// With `resume`, a persisted cursor searched within the staleness window is
    /// continued from its stored indices; anything else starts a fresh cycle.
    pub async fn run(&self, settings: Settings, resume: bool, cancel: CancellationToken) {
        self.active.store(true, Ordering::SeqCst);
        let mut cursor = self.initial_cursor(&settings, resume);
        info!(
            session = %cursor.session_id,
            topic_index = cursor.topic_index,
            keyword_index = cursor.keyword_index,
            "discovery started"
        );
        if let Err(e) = self.persist(&cursor) {
            warn!(error = %e, "failed to persist initial cursor");
        }

        while !cancel.is_cancelled() {
            if let Err(e) = self.step(&settings, &mut cursor, &cancel).await {
                error!(error = %e, "discovery loop error");
                sleep_or_cancel(&cancel, self.timings.loop_error_backoff).await;
            }
        }

        self.active.store(false, Ordering::SeqCst);
        info!(session = %cursor.session_id, "discovery stopped");
    }

    fn initial_cursor(&self, settings: &Settings, resume: bool) -> SearchCursor {
        let now = Utc::now();
        let fresh = || SearchCursor::fresh(settings.topics.clone(), settings.keywords.clone(), now);
        if !resume {
            return fresh();
        }

        let persisted = match self.store.load_state::<SearchCursor>(KEY_SEARCH_STATE) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "persisted search state unreadable, starting a fresh cycle");
                None
            }
        };

        match persisted {
            Some(c) if c.is_resumable(now, self.timings.cursor_staleness) => {
                info!(session = %c.session_id, "resuming search cycle");
                c
            }
            Some(c) => {
                info!(session = %c.session_id, "search state is stale, starting a fresh cycle");
                fresh()
            }
            None => fresh(),
        }
    }

    fn persist(&self, cursor: &SearchCursor) -> Result<()> {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(cursor.clone());
        }
        self.store.save_state(KEY_SEARCH_STATE, cursor)
    }

    /// One iteration of the main loop: a single combination, a cool-down, or an
    /// empty-space wait.
    async fn step(
        &self,
        settings: &Settings,
        cursor: &mut SearchCursor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cursor.cooldown_until.is_some() {
            let remaining = cursor.cooldown_remaining(Utc::now());
            if !remaining.is_zero() {
                info!(remaining_secs = remaining.as_secs(), "cooling down before the next cycle");
                if !sleep_or_cancel(cancel, remaining).await {
                    return Ok(());
                }
            }
            cursor.cooldown_until = None;
            self.persist(cursor)?;
            return Ok(());
        }

        if cursor.is_empty_space() {
            warn!("no topics or keywords configured, waiting");
            if sleep_or_cancel(cancel, self.timings.empty_space_wait).await {
                *cursor = SearchCursor::fresh(
                    settings.topics.clone(),
                    settings.keywords.clone(),
                    Utc::now(),
                );
            }
            return Ok(());
        }

        let Some((topic, keyword)) = cursor
            .current()
            .map(|(t, k)| (t.to_string(), k.to_string()))
        else {
            info!(
                found = cursor.discovered_channels.len(),
                "search space exhausted, cooling down"
            );
            *cursor = cursor.next_cycle(
                settings.topics.clone(),
                settings.keywords.clone(),
                Utc::now(),
                self.timings.cycle_cooldown,
            );
            return self.persist(cursor);
        };

        info!(
            topic = %topic,
            keyword = %keyword,
            combination = cursor.topic_index * cursor.keywords.len() + cursor.keyword_index + 1,
            total = cursor.topics.len() * cursor.keywords.len(),
            "searching"
        );

        let pause = match self.source.search(&topic, &keyword).await {
            Ok(found) => {
                self.absorb(found, cursor, cancel).await?;
                cursor.advance(Utc::now());
                random_secs(self.timings.search_delay)
            }
            Err(ProviderError::Transport(msg)) => {
                warn!(error = %msg, "discovery source unavailable, retrying the same combination");
                self.persist(cursor)?;
                sleep_or_cancel(cancel, self.timings.transport_backoff).await;
                return Ok(());
            }
            Err(ProviderError::RateLimited { wait }) => {
                warn!(wait_secs = wait.as_secs(), "discovery source rate limited");
                self.persist(cursor)?;
                sleep_or_cancel(cancel, wait).await;
                return Ok(());
            }
            Err(e) => {
                warn!(topic = %topic, keyword = %keyword, error = %e, "search failed, skipping combination");
                cursor.advance(Utc::now());
                self.timings.search_error_backoff
            }
        };

        self.persist(cursor)?;
        sleep_or_cancel(cancel, pause).await;
        Ok(())
    }

    /// Validate newly seen identifiers of one batch and enqueue the engageable ones.
    async fn absorb(
        &self,
        found: Vec<ChannelId>,
        cursor: &mut SearchCursor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut batch_seen = BTreeSet::new();
        let fresh: Vec<ChannelId> = found
            .into_iter()
            .filter(|c| !cursor.is_discovered(c) && batch_seen.insert(c.clone()))
            .collect();
        debug!(count = fresh.len(), "new identifiers in batch");

        for (i, channel) in fresh.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            if i > 0 && !sleep_or_cancel(cancel, random_secs(self.timings.validate_delay)).await {
                break;
            }
            if !self.validator.is_engageable(&channel).await {
                debug!(channel = %channel, "not engageable, skipped");
                continue;
            }

            cursor.discovered_channels.insert(channel.clone(), Utc::now());
            if let Err(e) = self.persist(cursor) {
                cursor.discovered_channels.remove(&channel);
                return Err(e);
            }
            self.queue.enqueue(channel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        processed::ProcessedRegistry,
        errors::ProviderError,
        testing::{ch, FakeSource, FakeValidator},
    };
    use std::time::Duration;

    struct Harness {
        store: StateStore,
        source: Arc<FakeSource>,
        validator: Arc<FakeValidator>,
        queue: Arc<EngagementQueue>,
        coordinator: Arc<DiscoveryCoordinator>,
    }

    fn harness(source: FakeSource, validator: FakeValidator) -> Harness {
        let store = StateStore::open_in_memory().unwrap();
        let registry = Arc::new(ProcessedRegistry::load(store.clone()).unwrap());
        let queue = Arc::new(EngagementQueue::new(registry));
        let source = Arc::new(source);
        let validator = Arc::new(validator);
        let coordinator = Arc::new(DiscoveryCoordinator::new(
            store.clone(),
            source.clone(),
            validator.clone(),
            queue.clone(),
            Timings::default(),
        ));
        Harness {
            store,
            source,
            validator,
            queue,
            coordinator,
        }
    }

    fn settings(topics: &[&str], keywords: &[&str]) -> Settings {
        Settings {
            topics: topics.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            ..Settings::default()
        }
    }

    fn spawn(h: &Harness, s: Settings, resume: bool) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let coordinator = h.coordinator.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { coordinator.run(s, resume, token).await });
        (cancel, handle)
    }

    fn persisted(store: &StateStore) -> SearchCursor {
        store
            .load_state::<SearchCursor>(KEY_SEARCH_STATE)
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn full_pass_wraps_to_origin_and_cools_down() {
        let h = harness(FakeSource::default(), FakeValidator::default());
        let (cancel, handle) = spawn(&h, settings(&["A", "B"], &["x", "y", "z"]), false);

        // Six combinations take at most 6 × 20 s of pacing.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.source.calls().len(), 6);
        let c = persisted(&h.store);
        assert_eq!((c.topic_index, c.keyword_index), (0, 0));
        assert!(c.cooldown_until.is_some());

        // Still cooling down well before 1800 s.
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(h.source.calls().len(), 6);

        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert!(h.source.calls().len() > 6);
        assert_eq!(h.source.calls()[6], ("A".to_string(), "x".to_string()));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_recent_cursor_with_its_discovered_set() {
        let h = harness(FakeSource::default(), FakeValidator::default());
        let mut saved = SearchCursor::fresh(
            vec!["A".into(), "B".into()],
            vec!["x".into(), "y".into()],
            Utc::now() - chrono::Duration::hours(1),
        );
        saved.discovered_channels.insert(ch("known"), Utc::now());
        saved.topic_index = 1;
        saved.keyword_index = 1;
        saved.last_search_time = Some(Utc::now() - chrono::Duration::minutes(30));
        h.store.save_state(KEY_SEARCH_STATE, &saved).unwrap();

        let (cancel, handle) = spawn(&h, settings(&["A", "B"], &["x", "y"]), true);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.source.calls(), vec![("B".to_string(), "y".to_string())]);
        let c = persisted(&h.store);
        assert_eq!(c.session_id, saved.session_id);
        assert!(c.is_discovered(&ch("known")));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cursor_starts_fresh_cycle() {
        let h = harness(FakeSource::default(), FakeValidator::default());
        let mut saved = SearchCursor::fresh(
            vec!["A".into(), "B".into()],
            vec!["x".into(), "y".into()],
            Utc::now() - chrono::Duration::hours(5),
        );
        saved.discovered_channels.insert(ch("old"), Utc::now() - chrono::Duration::hours(4));
        saved.topic_index = 1;
        saved.last_search_time = Some(Utc::now() - chrono::Duration::hours(3));
        h.store.save_state(KEY_SEARCH_STATE, &saved).unwrap();

        let (cancel, handle) = spawn(&h, settings(&["A", "B"], &["x", "y"]), true);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.source.calls(), vec![("A".to_string(), "x".to_string())]);
        let c = persisted(&h.store);
        assert_ne!(c.session_id, saved.session_id);
        assert!(c.discovered_channels.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_cursor_falls_back_to_fresh_cycle() {
        let h = harness(FakeSource::default(), FakeValidator::default());
        h.store.save_state(KEY_SEARCH_STATE, &"garbage").unwrap();

        let (cancel, handle) = spawn(&h, settings(&["A"], &["x"]), true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.source.calls().len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn validated_channels_are_recorded_and_queued_once() {
        let source = FakeSource::default()
            .with("A", "x", &["c1", "bad", "c1"])
            .with("A", "y", &["c1", "c2"]);
        let h = harness(source, FakeValidator::rejecting(&["bad"]));
        let (cancel, handle) = spawn(&h, settings(&["A"], &["x", "y"]), false);

        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(h.queue.snapshot(), vec![ch("c1"), ch("c2")]);
        let c = persisted(&h.store);
        assert_eq!(
            c.discovered_channels.keys().cloned().collect::<Vec<_>>(),
            vec![ch("c1"), ch("c2")]
        );
        // c1 is validated once; the repeat inside the first batch and the one in the
        // second batch are skipped.
        let checked = h.validator.checked.lock().unwrap().clone();
        assert_eq!(checked, vec![ch("c1"), ch("bad"), ch("c2")]);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_source_retries_same_combination() {
        let source = FakeSource::default().unavailable(2);
        let h = harness(source, FakeValidator::default());
        let (cancel, handle) = spawn(&h, settings(&["A"], &["x", "y"]), false);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(h.source.calls().len(), 1);

        tokio::time::sleep(Duration::from_secs(62)).await;
        let calls = h.source.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c == &("A".to_string(), "x".to_string())));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_space_waits_without_searching() {
        let h = harness(FakeSource::default(), FakeValidator::default());
        let (cancel, handle) = spawn(&h, settings(&[], &["x"]), false);
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert!(h.source.calls().is_empty());
        assert!(h.coordinator.is_active());

        cancel.cancel();
        handle.await.unwrap();
        assert!(!h.coordinator.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_tracks_live_cursor() {
        let h = harness(FakeSource::default(), FakeValidator::default());
        assert_eq!(h.coordinator.progress(), Progress::default());

        let (cancel, handle) = spawn(&h, settings(&["A", "B"], &["x", "y"]), false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let p = h.coordinator.progress();
        assert!(p.search_active);
        assert_eq!(p.total_combinations, 4);
        assert_eq!(p.current_combination, 1);

        cancel.cancel();
        handle.await.unwrap();
        assert!(!h.coordinator.progress().search_active);
    }

    #[tokio::test(start_paused = true)]
    async fn unfinished_channels_are_rediscovered_next_cycle() {
        let h = harness(
            FakeSource::default().with("A", "x", &["c1"]),
            FakeValidator::default(),
        );
        let (cancel, handle) = spawn(&h, settings(&["A"], &["x"]), true);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.queue.snapshot(), vec![ch("c1")]);

        // Dropped before the worker could record it.
        h.queue.drain();
        tokio::time::sleep(Duration::from_secs(2000)).await;

        assert_eq!(h.source.calls().len(), 2);
        assert_eq!(h.queue.snapshot(), vec![ch("c1")]);
        assert_eq!(h.validator.checked.lock().unwrap().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_combination_is_skipped_after_backoff() {
        let source = FakeSource::default().failing("A", "x", ProviderError::NotFound("bad query".into()));
        let h = harness(source, FakeValidator::default());
        let (cancel, handle) = spawn(&h, settings(&["A"], &["x", "y"]), false);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(h.source.calls(), vec![("A".to_string(), "x".to_string())]);
        let c = persisted(&h.store);
        assert_eq!((c.topic_index, c.keyword_index), (0, 1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            h.source.calls(),
            vec![
                ("A".to_string(), "x".to_string()),
                ("A".to_string(), "y".to_string()),
            ]
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_during_cooldown_waits_out_the_rest() {
        let h = harness(FakeSource::default(), FakeValidator::default());
        let (cancel, handle) = spawn(&h, settings(&["A"], &["x"]), false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.source.calls().len(), 1);
        cancel.cancel();
        handle.await.unwrap();

        let (cancel, handle) = spawn(&h, settings(&["A"], &["x"]), true);
        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(h.source.calls().len(), 1);

        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(h.source.calls().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
