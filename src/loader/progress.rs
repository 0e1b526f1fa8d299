// Progress side channel and relay
//
// Enumerations publish snapshots through a ProgressSink tagged with the
// generation of the session that started them. The relay forwards them to the
// orchestrator, which drops anything not belonging to the active session.

use crate::loader::LoadOrchestrator;
use crate::models::ProgressSnapshot;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Topic name of the package-list progress channel
pub const PROGRESS_TOPIC: &str = "app-list-progress";

/// A progress snapshot tagged with the generation that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub generation: u64,
    pub snapshot: ProgressSnapshot,
}

/// Broadcast side channel carrying [`ProgressEvent`]s
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn topic(&self) -> &'static str {
        PROGRESS_TOPIC
    }

    /// Publisher handle for the session with `generation`.
    pub fn sink(&self, generation: u64) -> ProgressSink {
        ProgressSink {
            generation,
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Publisher side handed to an enumeration
#[derive(Debug, Clone)]
pub struct ProgressSink {
    generation: u64,
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressSink {
    /// A sink nobody listens to.
    pub fn detached() -> Self {
        ProgressChannel::new(1).sink(0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Publish a snapshot. Returns whether any subscriber received it.
    pub fn report(&self, current: u64, total: u64, completed: bool) -> bool {
        let event = ProgressEvent {
            generation: self.generation,
            snapshot: ProgressSnapshot::new(current, total, completed),
        };
        self.tx.send(event).is_ok()
    }
}

/// Live subscription of a [`ProgressRelay`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ProgressSubscription {
    task: Option<JoinHandle<()>>,
}

impl ProgressSubscription {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Unsubscribed from {}", PROGRESS_TOPIC);
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Routes progress events from the side channel into an orchestrator
pub struct ProgressRelay;

impl ProgressRelay {
    /// Forward every event on `channel` to `orchestrator` until the returned
    /// subscription is dropped.
    pub fn subscribe<T>(channel: &ProgressChannel, orchestrator: LoadOrchestrator<T>) -> ProgressSubscription
    where
        T: Send + Sync + 'static,
    {
        let mut rx = channel.subscribe();
        tracing::debug!("Subscribed to {}", channel.topic());

        let runtime = orchestrator.runtime().clone();
        let task = runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        orchestrator.accept_progress(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Only the latest snapshot matters
                        tracing::trace!("Progress relay lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        ProgressSubscription { task: Some(task) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_generation() {
        let channel = ProgressChannel::new(8);
        let mut rx = channel.subscribe();

        assert!(channel.sink(4).report(10, 100, false));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.generation, 4);
        assert_eq!(event.snapshot, ProgressSnapshot::new(10, 100, false));
    }

    #[test]
    fn test_report_without_subscribers() {
        let sink = ProgressSink::detached();
        assert!(!sink.report(1, 2, false));
    }

    #[test]
    fn test_topic_name() {
        assert_eq!(ProgressChannel::default().topic(), "app-list-progress");
    }
}
