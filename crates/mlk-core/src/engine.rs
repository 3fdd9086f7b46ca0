//! The engine owns every piece of pipeline state and is the only surface the
//! control layer talks to.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cursor::Progress,
    discovery::DiscoveryCoordinator,
    messaging::port::MessagingProvider,
    ports::{ChannelValidator, ContentGenerator, DiscoverySource},
    processed::ProcessedRegistry,
    queue::EngagementQueue,
    settings::{Settings, Timings},
    stats::{Statistics, StatsTracker},
    store::{ControlFlags, StateStore, KEY_CHANNEL_QUEUE, KEY_SETTINGS},
    worker::EngagementWorker,
    Result,
};

/// How long `stop`/`shutdown` wait for an in-flight action before aborting the tasks.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// Outside collaborators, injected once.
pub struct EngineDeps {
    pub provider: Arc<dyn MessagingProvider>,
    pub source: Arc<dyn DiscoverySource>,
    pub validator: Arc<dyn ChannelValidator>,
    pub generator: Arc<dyn ContentGenerator>,
}

struct Run {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: StateStore,
    processed: Arc<ProcessedRegistry>,
    queue: Arc<EngagementQueue>,
    stats: Arc<StatsTracker>,
    coordinator: Arc<DiscoveryCoordinator>,
    worker: Arc<EngagementWorker>,
    retention_days: u32,
    run: Mutex<Option<Run>>,
}

impl Engine {
    pub fn new(
        store: StateStore,
        deps: EngineDeps,
        timings: Timings,
        retention_days: u32,
    ) -> Result<Self> {
        let processed = Arc::new(ProcessedRegistry::load(store.clone())?);
        let queue = Arc::new(EngagementQueue::new(processed.clone()));
        let stats = Arc::new(StatsTracker::load(&store));

        let coordinator = Arc::new(DiscoveryCoordinator::new(
            store.clone(),
            deps.source,
            deps.validator,
            queue.clone(),
            timings,
        ));
        let worker = Arc::new(EngagementWorker::new(
            deps.provider,
            deps.generator,
            queue.clone(),
            processed.clone(),
            stats.clone(),
            store.clone(),
            timings,
        ));

        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                processed,
                queue,
                stats,
                coordinator,
                worker,
                retention_days,
                run: Mutex::new(None),
            }),
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    /// Persisted settings, or the defaults.
    pub fn settings(&self) -> Settings {
        self.inner.store.load_state_or(KEY_SETTINGS, Settings::default())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.inner.store.save_state(KEY_SETTINGS, settings)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.run.lock().await.is_some()
    }

    /// Start discovery and engagement with `settings`, resuming a recent cycle.
    ///
    /// Returns `false` if already running.
    pub async fn start(&self, settings: Settings) -> Result<bool> {
        let mut run = self.inner.run.lock().await;
        if run.is_some() {
            return Ok(false);
        }
        let inner = &self.inner;

        if inner.retention_days > 0 {
            let pruned = inner.store.clear_processed_older_than(inner.retention_days)?;
            if pruned > 0 {
                info!(pruned, days = inner.retention_days, "old processed channels pruned");
                inner.processed.reload()?;
            }
        }
        inner.queue.restore(&inner.store);

        inner.store.save_state(KEY_SETTINGS, &settings)?;
        self.set_running_flag(true)?;

        let cancel = CancellationToken::new();
        let coordinator = inner.coordinator.clone();
        let discovery = {
            let settings = settings.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { coordinator.run(settings, true, cancel).await })
        };
        let worker = inner.worker.clone();
        let engagement = {
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(settings, cancel).await })
        };

        *run = Some(Run {
            cancel,
            tasks: vec![discovery, engagement],
        });
        info!("engine started");
        Ok(true)
    }

    /// Operator stop: halt both tasks, discard pending work.
    ///
    /// Returns `false` if nothing was running.
    pub async fn stop(&self) -> Result<bool> {
        if !self.halt().await {
            return Ok(false);
        }
        let inner = &self.inner;
        let dropped = inner.queue.drain();
        inner.store.delete_state(KEY_CHANNEL_QUEUE)?;
        inner.stats.persist(&inner.store);
        self.set_running_flag(false)?;
        info!(dropped, "engine stopped");
        Ok(true)
    }

    /// Process shutdown: halt both tasks but keep pending work and the run flag
    /// so the next boot resumes.
    pub async fn shutdown(&self) -> Result<()> {
        let was_running = self.halt().await;
        let inner = &self.inner;
        if was_running {
            inner.queue.persist(&inner.store)?;
        }
        inner.stats.persist(&inner.store);
        info!(pending = inner.queue.len(), "engine shut down");
        Ok(())
    }

    /// Restart with the persisted settings if the last process was running.
    pub async fn restore_on_boot(&self) -> Result<bool> {
        if !self.inner.store.control_flags().is_running {
            return Ok(false);
        }
        info!("resuming previous run");
        self.start(self.settings()).await
    }

    pub fn progress(&self) -> Progress {
        self.inner.coordinator.progress()
    }

    pub fn statistics(&self) -> Statistics {
        self.inner.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.inner.stats.reset();
        self.inner.stats.persist(&self.inner.store);
    }

    pub fn processed_count(&self) -> usize {
        self.inner.processed.len()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    async fn halt(&self) -> bool {
        let Some(run) = self.inner.run.lock().await.take() else {
            return false;
        };
        run.cancel.cancel();
        for mut task in run.tasks {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!("task did not stop in time, aborting");
                task.abort();
            }
        }
        true
    }

    fn set_running_flag(&self, running: bool) -> Result<()> {
        let flags = ControlFlags {
            is_running: running,
            ..self.inner.store.control_flags()
        };
        self.inner.store.save_control_flags(&flags)
    }
}
