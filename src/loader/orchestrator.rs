// Load orchestrator
//
// Decides between serving the package list from cache and starting a new
// enumeration session, and makes sure only the newest session's outcome ever
// reaches the cache or the visible state.

use crate::loader::cache::ResultCache;
use crate::loader::progress::{ProgressChannel, ProgressEvent};
use crate::loader::session::{LoadSession, LoadTicket, SessionHandle, SessionStatus};
use crate::metrics::LoadMetrics;
use crate::models::DeviceKey;
use crate::services::enumeration::{EnumerationError, EnumerationService, ErrorClass};
use crate::state::StateManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Coordinates cache, enumeration sessions and visible state
///
/// Cloning is cheap; all clones drive the same orchestrator.
///
/// # Generations
///
/// Every load attempt (including a cache hit) advances an atomic generation
/// counter. A session's outcome is applied only if the counter still equals
/// the session's generation when the outcome arrives; otherwise it is
/// discarded. The compare happens under the same lock that guards the cache
/// and the active session, so compare-and-apply is atomic.
///
/// # Related Types
///
/// - [`LoadView`](crate::loader::LoadView): mounts the orchestrator against a
///   selection source and a progress relay
/// - [`StateManager`]: visible state and change events
/// - [`EnumerationService`]: the backend producing the records
pub struct LoadOrchestrator<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    service: Arc<dyn EnumerationService<Record = T>>,
    progress: ProgressChannel,
    state: StateManager<T>,
    metrics: Arc<LoadMetrics>,
    runtime: Handle,
    generation: AtomicU64,
    core: Mutex<Core<T>>,
}

struct Core<T> {
    cache: ResultCache<T>,
    active: Option<LoadSession>,
    /// Most recently retired session, with its terminal status
    last: Option<LoadSession>,
}

impl<T> Core<T> {
    /// Retire the active session with `status`, returning it.
    fn retire(&mut self, status: SessionStatus) -> Option<LoadSession> {
        let mut session = self.active.take()?;
        session.settle(status);
        self.last = Some(session.clone());
        Some(session)
    }

    /// Cached list for `device`, treating an empty list as a miss
    fn hit(&self, device: &DeviceKey) -> Option<Arc<Vec<T>>> {
        self.cache.get(device).filter(|results| !results.is_empty())
    }
}

impl<T> Clone for LoadOrchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> LoadOrchestrator<T>
where
    T: Send + Sync + 'static,
{
    /// Create an orchestrator with fresh state and metrics.
    ///
    /// # Arguments
    /// * `service` - Backend that enumerates records for a device
    /// * `progress` - Side channel the service reports progress on
    /// * `runtime` - Handle used to spawn sessions and cancellation calls
    pub fn new(
        service: Arc<dyn EnumerationService<Record = T>>,
        progress: ProgressChannel,
        runtime: Handle,
    ) -> Self {
        Self::with_parts(
            service,
            progress,
            StateManager::new(),
            Arc::new(LoadMetrics::new()),
            runtime,
        )
    }

    /// Create an orchestrator around an existing state manager and metrics.
    pub fn with_parts(
        service: Arc<dyn EnumerationService<Record = T>>,
        progress: ProgressChannel,
        state: StateManager<T>,
        metrics: Arc<LoadMetrics>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                progress,
                state,
                metrics,
                runtime,
                generation: AtomicU64::new(0),
                core: Mutex::new(Core {
                    cache: ResultCache::new(),
                    active: None,
                    last: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> &StateManager<T> {
        &self.inner.state
    }

    pub fn metrics(&self) -> &Arc<LoadMetrics> {
        &self.inner.metrics
    }

    pub fn progress_channel(&self) -> &ProgressChannel {
        &self.inner.progress
    }

    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// The session currently in `Requesting` status, if any
    pub fn active_session(&self) -> Option<LoadSession> {
        self.inner.lock_core().active.clone()
    }

    /// The most recently retired session and the status it ended with
    pub fn last_session(&self) -> Option<LoadSession> {
        self.inner.lock_core().last.clone()
    }

    pub fn cached(&self, device: &DeviceKey) -> Option<Arc<Vec<T>>> {
        self.inner.lock_core().cache.get(device)
    }

    pub fn cached_devices(&self) -> Vec<DeviceKey> {
        let mut keys: Vec<DeviceKey> = self.inner.lock_core().cache.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Load the record list for `device`.
    ///
    /// Without `force_refresh`, a cached non-empty list is shown immediately
    /// and no enumeration runs; an empty cached list counts as a miss. A
    /// request for the device whose session is already running joins that
    /// session. Otherwise a new session is started and any running one is
    /// superseded.
    pub fn request(&self, device: DeviceKey, force_refresh: bool) -> LoadTicket {
        let mut core = self.inner.lock_core();

        if !force_refresh {
            if let Some(results) = core.hit(&device) {
                let generation = self.inner.advance_generation();
                if let Some(previous) = core.retire(SessionStatus::Discarded) {
                    tracing::debug!(
                        generation = previous.generation,
                        device = %previous.device,
                        "Session superseded by cached list"
                    );
                }

                let count = results.len();
                tracing::info!(generation, device = %device, count, "Serving package list from cache");
                self.inner.state.show_results(device.clone(), results);
                self.inner.metrics.record_cache_hit();
                return LoadTicket::Cached { device, count };
            }

            if let Some(active) = core.active.as_ref() {
                if active.is_requesting() && active.device == device {
                    tracing::debug!(
                        generation = active.generation,
                        device = %device,
                        "Load already in flight, not starting another"
                    );
                    self.inner.metrics.record_deduplicated();
                    return LoadTicket::InFlight {
                        generation: active.generation,
                    };
                }
            }
        }

        let generation = self.inner.advance_generation();
        if let Some(previous) = core.retire(SessionStatus::Discarded) {
            tracing::debug!(
                generation = previous.generation,
                device = %previous.device,
                "Session superseded"
            );
        }
        core.active = Some(LoadSession::new(generation, device.clone()));

        tracing::info!(generation, device = %device, force_refresh, "Starting package list session");
        self.inner.state.begin_loading();
        self.inner.metrics.record_session_started();

        let sink = self.inner.progress.sink(generation);
        let inner = Arc::clone(&self.inner);
        let task_device = device.clone();
        let task = self.inner.runtime.spawn(async move {
            let started = Instant::now();
            let outcome = inner.service.enumerate(&task_device, sink).await;
            inner.complete(generation, task_device, outcome, started.elapsed())
        });
        drop(core);

        LoadTicket::Started(SessionHandle::new(generation, device, task))
    }

    /// Reload the device currently on screen (or being loaded), bypassing the cache.
    ///
    /// Returns `None` when nothing has been requested yet.
    pub fn refresh(&self) -> Option<LoadTicket> {
        let device = self
            .active_session()
            .map(|session| session.device)
            .or_else(|| self.inner.state.read(|state| state.loaded_device.clone()));

        match device {
            Some(device) => Some(self.request(device, true)),
            None => {
                tracing::warn!("Refresh requested with no device loaded");
                None
            }
        }
    }

    /// Ask the service to stop the running enumeration.
    ///
    /// Only does anything while a session is `Requesting`. The returned handle
    /// belongs to the detached cancel call; nothing waits on it.
    pub fn cancel_active(&self) -> Option<JoinHandle<()>> {
        let core = self.inner.lock_core();
        let session = core.active.as_ref().filter(|session| session.is_requesting())?;

        tracing::info!(
            generation = session.generation,
            device = %session.device,
            "Requesting cancellation of active session"
        );
        self.inner.metrics.record_cancel_request();

        let service = Arc::clone(&self.inner.service);
        let handle = self.inner.runtime.spawn(async move {
            if let Err(e) = service.cancel().await {
                tracing::debug!("Cancel request failed: {}", e);
            }
        });
        drop(core);

        Some(handle)
    }

    /// React to the selection source: load the selected device, or reset
    /// everything when no device is selected.
    pub fn on_device_selection_changed(&self, device: Option<DeviceKey>) -> Option<LoadTicket> {
        match device {
            Some(device) => {
                let cache_miss = self.inner.lock_core().hit(&device).is_none();
                Some(self.request(device, cache_miss))
            }
            None => {
                self.disconnect();
                None
            }
        }
    }

    /// Device deselected: retire the session, drop all cached lists and
    /// reset visible state. No cancellation is sent.
    fn disconnect(&self) {
        let mut core = self.inner.lock_core();
        let generation = self.inner.advance_generation();
        core.retire(SessionStatus::Discarded);
        let cleared = core.cache.clear_all();

        tracing::info!(generation, cleared, "No device selected, cleared package list cache");
        self.inner.state.reset();
    }

    /// Remove one cached list; the visible list is cleared if it belongs to `device`.
    pub fn clear_cache(&self, device: &DeviceKey) -> bool {
        let mut core = self.inner.lock_core();
        let removed = core.cache.clear(device);
        self.inner.state.clear_results_for(device);

        tracing::debug!(device = %device, removed, "Cleared cached package list");
        removed
    }

    /// Remove every cached list and reset visible state.
    pub fn clear_all(&self) {
        let mut core = self.inner.lock_core();
        let cleared = core.cache.clear_all();
        self.inner.state.reset();

        tracing::debug!(cleared, "Cleared all cached package lists");
    }

    /// The owning view is going away: cancel a running session and retire it
    /// so its outcome can no longer touch cache or visible state.
    pub fn teardown(&self) -> Option<JoinHandle<()>> {
        let cancel = self.cancel_active();

        let mut core = self.inner.lock_core();
        let generation = self.inner.advance_generation();
        if let Some(session) = core.retire(SessionStatus::Cancelled) {
            tracing::debug!(
                generation = session.generation,
                device = %session.device,
                "Session retired by teardown"
            );
        }
        tracing::debug!(generation, "Load orchestrator torn down");

        cancel
    }

    /// Apply a progress event if it belongs to the running session.
    ///
    /// Returns whether the event was applied.
    pub fn accept_progress(&self, event: ProgressEvent) -> bool {
        let core = self.inner.lock_core();
        let is_current = core
            .active
            .as_ref()
            .is_some_and(|session| session.is_requesting() && session.generation == event.generation);

        if is_current {
            self.inner.state.set_progress(event.snapshot);
        } else {
            tracing::trace!(generation = event.generation, "Dropping stale progress event");
            self.inner.metrics.record_progress_dropped();
        }

        is_current
    }
}

impl<T> Inner<T> {
    fn lock_core(&self) -> MutexGuard<'_, Core<T>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers must hold the core lock.
    fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Settle a session: compare its generation and apply or discard.
    fn complete(
        &self,
        generation: u64,
        device: DeviceKey,
        outcome: Result<Vec<T>, EnumerationError>,
        elapsed: Duration,
    ) -> SessionStatus {
        let mut core = self.lock_core();
        let is_current = self.generation.load(Ordering::SeqCst) == generation;

        let status = match outcome {
            Ok(records) if is_current => {
                let results = Arc::new(records);
                tracing::info!(
                    generation,
                    device = %device,
                    count = results.len(),
                    "Loaded package list in {:.2}s",
                    elapsed.as_secs_f32()
                );
                core.cache.put(device.clone(), Arc::clone(&results));
                self.state.show_loaded(device, results);
                self.metrics.record_load_time(elapsed);
                SessionStatus::Completed
            }
            Ok(records) => {
                tracing::debug!(
                    generation,
                    device = %device,
                    count = records.len(),
                    "Discarding superseded package list"
                );
                SessionStatus::Discarded
            }
            Err(err) => match err.class() {
                ErrorClass::Cancellation => {
                    tracing::debug!(generation, device = %device, "Package list session cancelled: {}", err);
                    if is_current {
                        self.state.finish_loading();
                    }
                    SessionStatus::Cancelled
                }
                ErrorClass::Transport if is_current => {
                    tracing::error!(generation, device = %device, "Failed to load package list: {}", err);
                    core.cache.put(device.clone(), Arc::new(Vec::new()));
                    self.state.show_failure(device, err.to_string());
                    SessionStatus::Failed
                }
                ErrorClass::Transport => {
                    tracing::debug!(
                        generation,
                        device = %device,
                        "Ignoring failure of superseded session: {}",
                        err
                    );
                    SessionStatus::Discarded
                }
            },
        };

        if is_current {
            core.retire(status);
        }
        self.metrics.record_outcome(status);

        status
    }
}
