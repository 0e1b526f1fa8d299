// Load view lifetime
//
// A mounted view owns the progress subscription and the selection watcher.
// Dropping or tearing it down releases both and retires the active session.

use crate::loader::LoadOrchestrator;
use crate::loader::progress::{ProgressRelay, ProgressSubscription};
use crate::models::DeviceKey;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Scoped binding between a selection source and a [`LoadOrchestrator`]
///
/// While mounted, every change of the selected device key is forwarded to
/// [`LoadOrchestrator::on_device_selection_changed`] and progress events are
/// relayed into visible state. The current selection is applied immediately
/// on mount.
pub struct LoadView<T>
where
    T: Send + Sync + 'static,
{
    orchestrator: LoadOrchestrator<T>,
    subscription: Option<ProgressSubscription>,
    watcher: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl<T> LoadView<T>
where
    T: Send + Sync + 'static,
{
    /// Mount the view.
    ///
    /// # Arguments
    /// * `orchestrator` - Orchestrator to drive
    /// * `selection` - Receiver of the active device key (`None` when no device is selected)
    pub fn mount(orchestrator: LoadOrchestrator<T>, selection: watch::Receiver<Option<DeviceKey>>) -> Self {
        let subscription = ProgressRelay::subscribe(orchestrator.progress_channel(), orchestrator.clone());
        let watcher = orchestrator
            .runtime()
            .spawn(watch_selection(orchestrator.clone(), selection));

        tracing::debug!("Load view mounted");

        Self {
            orchestrator,
            subscription: Some(subscription),
            watcher: Some(watcher),
            torn_down: false,
        }
    }

    pub fn orchestrator(&self) -> &LoadOrchestrator<T> {
        &self.orchestrator
    }

    pub fn is_mounted(&self) -> bool {
        !self.torn_down
    }

    /// Unmount the view.
    ///
    /// Returns the handle of the cancellation sent to the backend, if a
    /// session was running.
    pub fn teardown(mut self) -> Option<JoinHandle<()>> {
        self.release()
    }

    fn release(&mut self) -> Option<JoinHandle<()>> {
        if self.torn_down {
            return None;
        }
        self.torn_down = true;

        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }

        tracing::debug!("Load view torn down");
        self.orchestrator.teardown()
    }
}

impl<T> Drop for LoadView<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release();
    }
}

async fn watch_selection<T>(orchestrator: LoadOrchestrator<T>, mut selection: watch::Receiver<Option<DeviceKey>>)
where
    T: Send + Sync + 'static,
{
    let initial = selection.borrow_and_update().clone();
    orchestrator.on_device_selection_changed(initial);

    while selection.changed().await.is_ok() {
        let device = selection.borrow_and_update().clone();
        tracing::debug!(device = ?device, "Selected device changed");
        orchestrator.on_device_selection_changed(device);
    }

    tracing::debug!("Selection source closed");
}
