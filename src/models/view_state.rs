use crate::models::{DeviceKey, ProgressSnapshot};
use std::sync::Arc;

/// Everything the presentation layer shows about the package list.
///
/// `results` is shared with the result cache, so cloning a `ViewState` (which
/// [`StateManager`](crate::state::StateManager) does on every update for
/// change detection) never copies the record list.
///
/// # Thread Safety
///
/// `ViewState` is wrapped in `Arc<RwLock<ViewState<T>>>` by
/// [`crate::state::StateManager`]. Mutate it through the manager so that
/// [`StateChange`](crate::state::StateChange) events are emitted.
#[derive(Debug)]
pub struct ViewState<T> {
    /// Records currently on screen
    pub results: Arc<Vec<T>>,

    /// Device the visible records belong to
    pub loaded_device: Option<DeviceKey>,

    pub is_loading: bool,

    /// Progress of the active session, `None` when idle or not yet reported
    pub progress: Option<ProgressSnapshot>,

    /// Description of the last transport failure, cleared by the next success
    pub last_error: Option<String>,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            results: Arc::new(Vec::new()),
            loaded_device: None,
            is_loading: false,
            progress: None,
            last_error: None,
        }
    }
}

impl<T> Clone for ViewState<T> {
    fn clone(&self) -> Self {
        Self {
            results: Arc::clone(&self.results),
            loaded_device: self.loaded_device.clone(),
            is_loading: self.is_loading,
            progress: self.progress,
            last_error: self.last_error.clone(),
        }
    }
}

impl<T> ViewState<T> {
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Whether the records on screen belong to `device`.
    pub fn is_showing(&self, device: &DeviceKey) -> bool {
        self.loaded_device.as_ref() == Some(device)
    }

    /// Clear the visible list without touching the loading flag.
    pub fn clear_results(&mut self) {
        self.results = Arc::new(Vec::new());
        self.loaded_device = None;
    }

    /// Return to the initial, empty state.
    pub fn reset(&mut self) {
        self.clear_results();
        self.is_loading = false;
        self.progress = None;
        self.last_error = None;
    }
}
