//! Integration tests for DeviceSelection driving a mounted load view
//!
//! These tests verify the selection policy end to end: device list updates
//! from the tracker become active-key changes, which the view turns into
//! loads, cache hits and resets.

use adbdeck::loader::{LoadOrchestrator, LoadView, ProgressChannel, ProgressSink};
use adbdeck::models::{DeviceInfo, DeviceKey};
use adbdeck::selection::{DeviceSelection, SelectionChange};
use adbdeck::services::{EnumerationError, EnumerationService};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, sleep, timeout};

/// Records every enumerated key and answers with one record per call so far
#[derive(Default)]
struct RecordingService {
    calls: Mutex<Vec<DeviceKey>>,
}

impl RecordingService {
    fn calls(&self) -> Vec<DeviceKey> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnumerationService for RecordingService {
    type Record = String;

    async fn enumerate(&self, device: &DeviceKey, _progress: ProgressSink) -> Result<Vec<String>, EnumerationError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(device.clone());
        Ok(vec![format!("com.example.{}", calls.len())])
    }

    async fn cancel(&self) -> Result<(), EnumerationError> {
        Ok(())
    }
}

fn setup() -> (DeviceSelection, Arc<RecordingService>, LoadOrchestrator<String>) {
    let service = Arc::new(RecordingService::default());
    let orchestrator = LoadOrchestrator::new(
        Arc::clone(&service) as Arc<dyn EnumerationService<Record = String>>,
        ProgressChannel::default(),
        tokio::runtime::Handle::current(),
    );
    (DeviceSelection::new(), service, orchestrator)
}

/// Wait until `condition` holds or a second passes.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timeout waiting for condition");
}

#[tokio::test]
async fn test_single_device_loads_with_single_key() {
    let (selection, service, orchestrator) = setup();
    let _view = LoadView::mount(orchestrator.clone(), selection.subscribe_key());

    selection.set_devices(vec![DeviceInfo::new("R58M12345", "Galaxy S10")]);

    wait_for(|| orchestrator.state().read(|s| s.result_count()) == 1).await;
    assert_eq!(service.calls(), vec![DeviceKey::single_device()]);
}

#[tokio::test]
async fn test_second_device_switches_to_serial_keys() {
    let (selection, service, orchestrator) = setup();
    let _view = LoadView::mount(orchestrator.clone(), selection.subscribe_key());

    selection.set_devices(vec![DeviceInfo::new("a", "Pixel")]);
    wait_for(|| service.calls().len() == 1).await;

    selection.set_devices(vec![DeviceInfo::new("a", "Pixel"), DeviceInfo::new("b", "Galaxy")]);
    wait_for(|| service.calls().len() == 2).await;

    assert_eq!(service.calls()[1], DeviceKey::new("a"));
}

#[tokio::test]
async fn test_switching_back_uses_cache() {
    let (selection, service, orchestrator) = setup();
    let _view = LoadView::mount(orchestrator.clone(), selection.subscribe_key());

    selection.set_devices(vec![DeviceInfo::new("a", "Pixel"), DeviceInfo::new("b", "Galaxy")]);
    wait_for(|| orchestrator.cached(&DeviceKey::new("a")).is_some()).await;

    selection.select("b").unwrap();
    wait_for(|| orchestrator.cached(&DeviceKey::new("b")).is_some()).await;

    selection.select("a").unwrap();
    wait_for(|| orchestrator.state().read(|s| s.is_showing(&DeviceKey::new("a")))).await;

    assert_eq!(service.calls(), vec![DeviceKey::new("a"), DeviceKey::new("b")]);
}

#[tokio::test]
async fn test_all_devices_gone_resets_loader() {
    let (selection, _service, orchestrator) = setup();
    let _view = LoadView::mount(orchestrator.clone(), selection.subscribe_key());

    selection.set_devices(vec![DeviceInfo::new("a", "Pixel")]);
    wait_for(|| orchestrator.state().read(|s| s.result_count()) == 1).await;

    selection.set_devices(Vec::new());
    wait_for(|| orchestrator.cached_devices().is_empty()).await;

    assert!(orchestrator.state().read(|s| s.loaded_device.is_none()));
}

#[tokio::test]
async fn test_selection_events() {
    let selection = DeviceSelection::new();
    let mut rx = selection.subscribe();

    selection.set_devices(vec![DeviceInfo::new("a", "Pixel"), DeviceInfo::new("b", "Galaxy")]);
    selection.select("b").unwrap();
    selection.clear();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(
        events,
        vec![
            SelectionChange::DevicesChanged { count: 2 },
            SelectionChange::SelectedChanged {
                selected: Some("a".to_string())
            },
            SelectionChange::SelectedChanged {
                selected: Some("b".to_string())
            },
            SelectionChange::SelectedChanged { selected: None },
        ]
    );
}
