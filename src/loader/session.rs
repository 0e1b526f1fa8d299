use crate::models::DeviceKey;
use tokio::task::JoinHandle;

/// Lifecycle of one load attempt. Every status except `Requesting` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Requesting,
    /// Result applied to cache and visible state
    Completed,
    /// Transport failure while current; visible list blanked
    Failed,
    /// Outcome arrived after a newer generation started
    Discarded,
    /// Enumeration reported cancellation
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Requesting)
    }
}

/// One logical load attempt, tagged with the generation that started it.
///
/// A session is `Requesting` while it is the orchestrator's active one and
/// gets its terminal status when it is retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSession {
    pub generation: u64,
    pub device: DeviceKey,
    pub status: SessionStatus,
}

impl LoadSession {
    pub fn new(generation: u64, device: DeviceKey) -> Self {
        Self {
            generation,
            device,
            status: SessionStatus::Requesting,
        }
    }

    pub fn is_requesting(&self) -> bool {
        self.status == SessionStatus::Requesting
    }

    /// Move to a terminal status. A session that already settled keeps its
    /// first terminal status.
    pub fn settle(&mut self, status: SessionStatus) {
        if self.is_requesting() && status.is_terminal() {
            self.status = status;
        }
    }
}

/// Handle to a started session; await [`finished`](Self::finished) for its outcome.
#[derive(Debug)]
pub struct SessionHandle {
    generation: u64,
    device: DeviceKey,
    task: JoinHandle<SessionStatus>,
}

impl SessionHandle {
    pub(crate) fn new(generation: u64, device: DeviceKey, task: JoinHandle<SessionStatus>) -> Self {
        Self {
            generation,
            device,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn device(&self) -> &DeviceKey {
        &self.device
    }

    /// Wait for the session's terminal status.
    pub async fn finished(self) -> SessionStatus {
        match self.task.await {
            Ok(status) => status,
            Err(e) if e.is_cancelled() => SessionStatus::Cancelled,
            Err(e) => {
                tracing::error!(
                    generation = self.generation,
                    device = %self.device,
                    "Load session task panicked: {}",
                    e
                );
                SessionStatus::Failed
            }
        }
    }
}

/// What a [`request`](crate::loader::LoadOrchestrator::request) did.
#[derive(Debug)]
pub enum LoadTicket {
    /// Served from cache; no enumeration happened
    Cached { device: DeviceKey, count: usize },

    /// The same device is already being loaded by this generation
    InFlight { generation: u64 },

    /// A new session was started
    Started(SessionHandle),
}

impl LoadTicket {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }

    pub fn started(self) -> Option<SessionHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            _ => None,
        }
    }

    /// Wait for the started session, if any.
    pub async fn finished(self) -> Option<SessionStatus> {
        match self {
            Self::Started(handle) => Some(handle.finished().await),
            _ => None,
        }
    }
}
