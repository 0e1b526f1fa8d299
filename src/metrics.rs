// Load metrics module
//
// Lightweight counters for the package-list loader

use crate::loader::SessionStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for load sessions
///
/// Uses atomic operations for thread-safe tracking without locks. Updated by
/// the orchestrator and logged on shutdown.
#[derive(Debug)]
pub struct LoadMetrics {
    pub sessions_started: AtomicU64,
    pub sessions_completed: AtomicU64,
    pub sessions_failed: AtomicU64,
    pub sessions_cancelled: AtomicU64,
    pub sessions_discarded: AtomicU64,

    /// Requests served from the result cache
    pub cache_hits: AtomicU64,

    /// Non-forced requests that joined an in-flight session
    pub deduplicated_requests: AtomicU64,

    /// Progress events dropped because they belonged to a retired session
    pub progress_dropped: AtomicU64,

    pub cancel_requests: AtomicU64,

    /// Total enumeration time of applied sessions in milliseconds
    pub total_load_time_ms: AtomicU64,

    start_time: Instant,
}

impl LoadMetrics {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            sessions_cancelled: AtomicU64::new(0),
            sessions_discarded: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            deduplicated_requests: AtomicU64::new(0),
            progress_dropped: AtomicU64::new(0),
            cancel_requests: AtomicU64::new(0),
            total_load_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the terminal status of a session
    pub fn record_outcome(&self, status: SessionStatus) {
        let counter = match status {
            SessionStatus::Completed => &self.sessions_completed,
            SessionStatus::Failed => &self.sessions_failed,
            SessionStatus::Cancelled => &self.sessions_cancelled,
            SessionStatus::Discarded => &self.sessions_discarded,
            SessionStatus::Requesting => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deduplicated(&self) {
        self.deduplicated_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_dropped(&self) {
        self.progress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancel_request(&self) {
        self.cancel_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_time(&self, duration: Duration) {
        self.total_load_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average enumeration time of completed sessions in milliseconds
    pub fn avg_load_time_ms(&self) -> f64 {
        let total = self.total_load_time_ms.load(Ordering::Relaxed);
        let count = self.sessions_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Load Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Sessions: {} started, {} completed, {} failed, {} cancelled, {} discarded",
            self.sessions_started.load(Ordering::Relaxed),
            self.sessions_completed.load(Ordering::Relaxed),
            self.sessions_failed.load(Ordering::Relaxed),
            self.sessions_cancelled.load(Ordering::Relaxed),
            self.sessions_discarded.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Cache hits: {}, deduplicated requests: {}, cancel requests: {}",
            self.cache_hits.load(Ordering::Relaxed),
            self.deduplicated_requests.load(Ordering::Relaxed),
            self.cancel_requests.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Average load time: {:.2}ms, stale progress events dropped: {}",
            self.avg_load_time_ms(),
            self.progress_dropped.load(Ordering::Relaxed)
        );
    }
}

impl Default for LoadMetrics {
    fn default() -> Self {
        Self::new()
    }
}
