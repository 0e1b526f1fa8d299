// State management module
//
// This module provides the StateManager which wraps the visible ViewState with
// thread-safe access using Arc<RwLock<T>> and emits change events for the
// presentation layer.

use crate::models::{DeviceKey, ProgressSnapshot, ViewState};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when visible state is modified
///
/// These events let the presentation layer react without polling. The
/// `LoadSucceeded` / `LoadFailed` variants double as user notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The loading flag flipped
    LoadingChanged { is_loading: bool },

    /// Progress of the active session changed (`None` when cleared)
    ProgressUpdated { progress: Option<ProgressSnapshot> },

    /// The visible record list was replaced
    ResultsChanged {
        device: Option<DeviceKey>,
        count: usize,
    },

    /// A session finished and its records are on screen
    LoadSucceeded { device: DeviceKey, count: usize },

    /// A session failed with a transport or backend error
    LoadFailed { device: DeviceKey, message: String },

    /// Visible state has been reset
    StateReset,
}

/// Thread-safe visible-state manager with event emission
///
/// This is the single place visible state is stored:
/// - Provides thread-safe access to [`ViewState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Usage
///
/// - [`read()`](Self::read) for reading state through a closure
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// The load orchestrator is the only writer in practice; see
/// [`crate::loader::LoadOrchestrator`].
pub struct StateManager<T> {
    /// The visible state protected by RwLock for thread-safe access
    state: Arc<RwLock<ViewState<T>>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl<T> StateManager<T> {
    /// Create a new StateManager with empty state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ViewState::default())),
            state_tx,
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, ViewState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ViewState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a snapshot of the current state
    ///
    /// Cheap: the record list is shared, not copied.
    pub fn snapshot(&self) -> ViewState<T> {
        self.read_guard().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let loading = state_manager.read(|state| state.is_loading);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ViewState<T>) -> R,
    {
        let state = self.read_guard();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut ViewState<T>),
    {
        let mut state = self.write_guard();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, changes: &mut Vec<StateChange>, event: StateChange) {
        let _ = self.state_tx.send(event.clone());
        changes.push(event);
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &ViewState<T>, new: &ViewState<T>) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_loading != new.is_loading {
            changes.push(StateChange::LoadingChanged {
                is_loading: new.is_loading,
            });
        }

        if old.progress != new.progress {
            changes.push(StateChange::ProgressUpdated {
                progress: new.progress,
            });
        }

        if !Arc::ptr_eq(&old.results, &new.results) || old.loaded_device != new.loaded_device {
            changes.push(StateChange::ResultsChanged {
                device: new.loaded_device.clone(),
                count: new.results.len(),
            });
        }

        changes
    }

    // Convenience methods for the load lifecycle

    /// A new session started: show the spinner and drop stale progress
    pub fn begin_loading(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_loading = true;
            state.progress = None;
            state.last_error = None;
        })
    }

    pub fn set_progress(&self, progress: ProgressSnapshot) -> Vec<StateChange> {
        self.update(|state| {
            state.progress = Some(progress);
        })
    }

    /// Show `results` for `device` and leave the loading state
    pub fn show_results(&self, device: DeviceKey, results: Arc<Vec<T>>) -> Vec<StateChange> {
        self.update(|state| {
            state.results = results;
            state.loaded_device = Some(device);
            state.is_loading = false;
            state.progress = None;
        })
    }

    /// Show freshly loaded results and notify about them
    pub fn show_loaded(&self, device: DeviceKey, results: Arc<Vec<T>>) -> Vec<StateChange> {
        let count = results.len();
        let mut changes = self.update(|state| {
            state.results = results;
            state.loaded_device = Some(device.clone());
            state.is_loading = false;
            state.progress = None;
            state.last_error = None;
        });

        self.emit(&mut changes, StateChange::LoadSucceeded { device, count });
        changes
    }

    /// Blank the list for `device` and surface the failure
    pub fn show_failure(&self, device: DeviceKey, message: String) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.results = Arc::new(Vec::new());
            state.loaded_device = Some(device.clone());
            state.is_loading = false;
            state.progress = None;
            state.last_error = Some(message.clone());
        });

        self.emit(&mut changes, StateChange::LoadFailed { device, message });
        changes
    }

    /// Leave the loading state without touching the visible list
    pub fn finish_loading(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_loading = false;
            state.progress = None;
        })
    }

    /// Clear the visible list if it belongs to `device`
    pub fn clear_results_for(&self, device: &DeviceKey) -> Vec<StateChange> {
        self.update(|state| {
            if state.is_showing(device) {
                state.clear_results();
            }
        })
    }

    /// Reset all visible state
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.reset();
        });

        self.emit(&mut changes, StateChange::StateReset);
        changes
    }

    /// Get an Arc reference to the state for sharing with worker tasks
    pub fn state_arc(&self) -> Arc<RwLock<ViewState<T>>> {
        Arc::clone(&self.state)
    }
}

impl<T> Default for StateManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across tasks
impl<T> Clone for StateManager<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
