//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Handles concurrent access from multiple tasks
//! - Maintains consistency across load lifecycle transitions

use adbdeck::models::{DeviceKey, ProgressSnapshot};
use adbdeck::{StateChange, StateManager};
use std::sync::Arc;
use tokio::time::{Duration, timeout};

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<StateChange>) -> StateChange {
    timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

#[tokio::test]
async fn test_state_change_events_emitted() {
    let state: StateManager<String> = StateManager::new();
    let mut rx = state.subscribe();

    state.begin_loading();

    let event = next_event(&mut rx).await;
    assert!(
        matches!(event, StateChange::LoadingChanged { is_loading: true }),
        "Expected LoadingChanged event, got: {:?}",
        event
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state: StateManager<String> = StateManager::new();
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();
    let mut rx3 = state.subscribe();

    state.set_progress(ProgressSnapshot::new(1, 4, false));

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let event = next_event(rx).await;
        assert!(matches!(event, StateChange::ProgressUpdated { progress: Some(_) }));
    }
}

#[tokio::test]
async fn test_load_lifecycle_events() {
    let state: StateManager<String> = StateManager::new();
    let mut rx = state.subscribe();
    let device = DeviceKey::new("emulator-5554");

    state.begin_loading();
    state.set_progress(ProgressSnapshot::new(50, 100, false));
    state.show_loaded(device.clone(), Arc::new(vec!["com.a".to_string(), "com.b".to_string()]));

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events[0], StateChange::LoadingChanged { is_loading: true });
    assert_eq!(
        events[1],
        StateChange::ProgressUpdated {
            progress: Some(ProgressSnapshot::new(50, 100, false))
        }
    );
    assert!(events.contains(&StateChange::LoadingChanged { is_loading: false }));
    assert!(events.contains(&StateChange::ResultsChanged {
        device: Some(device.clone()),
        count: 2
    }));
    assert_eq!(events.last(), Some(&StateChange::LoadSucceeded { device, count: 2 }));
}

#[tokio::test]
async fn test_failure_then_success_clears_error() {
    let state: StateManager<String> = StateManager::new();
    let device = DeviceKey::new("a");

    state.show_failure(device.clone(), "device offline".to_string());
    assert_eq!(state.read(|s| s.last_error.clone()).as_deref(), Some("device offline"));

    state.begin_loading();
    assert!(state.read(|s| s.last_error.is_none()));

    state.show_loaded(device, Arc::new(vec!["com.a".to_string()]));
    assert_eq!(state.read(|s| s.result_count()), 1);
}

#[tokio::test]
async fn test_shared_results_are_not_copied() {
    let state: StateManager<String> = StateManager::new();
    let results = Arc::new(vec!["com.a".to_string()]);

    state.show_results(DeviceKey::new("a"), Arc::clone(&results));

    let snapshot = state.snapshot();
    assert!(Arc::ptr_eq(&snapshot.results, &results));
}

#[tokio::test]
async fn test_concurrent_state_access() {
    let state: Arc<StateManager<String>> = Arc::new(StateManager::new());
    let mut handles = vec![];

    for i in 0..10u64 {
        let state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            state.set_progress(ProgressSnapshot::new(i, 10, false));
            state.read(|s| s.progress.is_some())
        });
        handles.push(handle);
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let progress = state.read(|s| s.progress).unwrap();
    assert_eq!(progress.total, 10);
    assert!(progress.current < 10);
}

#[tokio::test]
async fn test_reset_state() {
    let state: StateManager<String> = StateManager::new();
    let mut rx = state.subscribe();

    state.show_results(DeviceKey::single_device(), Arc::new(vec!["com.a".to_string()]));
    state.begin_loading();
    state.reset();

    let mut saw_reset = false;
    while let Ok(event) = rx.try_recv() {
        saw_reset |= event == StateChange::StateReset;
    }
    assert!(saw_reset);

    let snapshot = state.snapshot();
    assert!(!snapshot.is_loading);
    assert!(snapshot.loaded_device.is_none());
    assert_eq!(snapshot.result_count(), 0);
}
