//! Device selection source
//!
//! Holds the connected devices and the selected one. Consumers either watch
//! the derived active [`DeviceKey`] (what the loader needs) or subscribe to
//! [`SelectionChange`] events.

use crate::models::{DeviceInfo, DeviceKey};
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("device '{0}' is not connected")]
    UnknownDevice(String),
}

/// Events emitted when the device list or selection changes
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionChange {
    DevicesChanged { count: usize },
    SelectedChanged { selected: Option<String> },
}

#[derive(Debug, Default)]
struct SelectionState {
    /// Connected devices in tracker order
    devices: IndexMap<String, DeviceInfo>,
    selected: Option<String>,
}

impl SelectionState {
    /// With more than one device attached, commands must name the serial.
    fn active_key(&self) -> Option<DeviceKey> {
        let selected = self.selected.as_ref()?;
        if self.devices.len() > 1 {
            Some(DeviceKey::new(selected.as_str()))
        } else {
            Some(DeviceKey::single_device())
        }
    }

    fn first_id(&self) -> Option<String> {
        self.devices.keys().next().cloned()
    }
}

/// Shared device list plus selection
///
/// Cloning shares the same underlying state and channels.
#[derive(Clone)]
pub struct DeviceSelection {
    state: Arc<RwLock<SelectionState>>,
    key_tx: watch::Sender<Option<DeviceKey>>,
    event_tx: broadcast::Sender<SelectionChange>,
}

impl DeviceSelection {
    pub fn new() -> Self {
        let (key_tx, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(32);
        Self {
            state: Arc::new(RwLock::new(SelectionState::default())),
            key_tx,
            event_tx,
        }
    }

    /// Replace the device list.
    ///
    /// If nothing is selected (or the selected device went away) the first
    /// device is selected; an empty list clears the selection.
    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let new_devices: IndexMap<String, DeviceInfo> =
            devices.into_iter().map(|device| (device.id.clone(), device)).collect();
        let devices_changed = new_devices != state.devices;
        state.devices = new_devices;

        let previous = state.selected.clone();
        let still_present = previous
            .as_ref()
            .is_some_and(|id| state.devices.contains_key(id));
        if !still_present {
            state.selected = state.first_id();
        }

        if devices_changed {
            tracing::debug!("Device list updated: {} connected", state.devices.len());
            self.emit(SelectionChange::DevicesChanged {
                count: state.devices.len(),
            });
        }
        if state.selected != previous {
            tracing::info!("Selected device: {}", state.selected.as_deref().unwrap_or("none"));
            self.emit(SelectionChange::SelectedChanged {
                selected: state.selected.clone(),
            });
        }

        self.publish_key(&state);
    }

    /// Select a connected device by id.
    pub fn select(&self, id: &str) -> Result<(), SelectionError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.devices.contains_key(id) {
            return Err(SelectionError::UnknownDevice(id.to_string()));
        }

        if state.selected.as_deref() != Some(id) {
            state.selected = Some(id.to_string());
            tracing::info!("Selected device: {}", id);
            self.emit(SelectionChange::SelectedChanged {
                selected: state.selected.clone(),
            });
            self.publish_key(&state);
        }
        Ok(())
    }

    /// Deselect `id` if it is selected, otherwise select it.
    pub fn toggle(&self, id: &str) -> Result<(), SelectionError> {
        if self.selected().as_deref() == Some(id) {
            self.clear();
            Ok(())
        } else {
            self.select(id)
        }
    }

    /// Clear the selection, keeping the device list.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.selected.take().is_some() {
            tracing::info!("Device selection cleared");
            self.emit(SelectionChange::SelectedChanged { selected: None });
            self.publish_key(&state);
        }
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.devices.values().cloned().collect()
    }

    pub fn selected(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.selected.clone()
    }

    /// Key the loader should use for the current selection.
    pub fn active_key(&self) -> Option<DeviceKey> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.active_key()
    }

    /// Watch the active key. The receiver starts at the current value.
    pub fn subscribe_key(&self) -> watch::Receiver<Option<DeviceKey>> {
        self.key_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SelectionChange> {
        self.event_tx.subscribe()
    }

    fn publish_key(&self, state: &SelectionState) {
        let key = state.active_key();
        self.key_tx.send_if_modified(|current| {
            if *current == key {
                false
            } else {
                *current = key;
                true
            }
        });
    }

    fn emit(&self, change: SelectionChange) {
        // No subscribers is fine
        let _ = self.event_tx.send(change);
    }
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self::new()
    }
}
