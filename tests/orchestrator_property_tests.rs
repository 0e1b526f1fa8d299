//! Mock-based and property-based tests for the load orchestrator
//!
//! - A mockall service verifies call counts: one enumeration per cache miss,
//!   no cancellation when idle
//! - proptest checks that the generation counter only moves forward, by
//!   exactly one for every load attempt, under arbitrary request sequences

use adbdeck::loader::{LoadOrchestrator, LoadTicket, ProgressChannel, ProgressSink, SessionStatus};
use adbdeck::models::DeviceKey;
use adbdeck::services::{EnumerationError, EnumerationService};
use async_trait::async_trait;
use mockall::mock;
use proptest::prelude::*;
use std::sync::Arc;

mock! {
    pub Enumerator {}

    #[async_trait]
    impl EnumerationService for Enumerator {
        type Record = u32;

        async fn enumerate(
            &self,
            device: &DeviceKey,
            progress: ProgressSink,
        ) -> Result<Vec<u32>, EnumerationError>;

        async fn cancel(&self) -> Result<(), EnumerationError>;
    }
}

fn orchestrator_with(service: MockEnumerator) -> LoadOrchestrator<u32> {
    LoadOrchestrator::new(
        Arc::new(service),
        ProgressChannel::new(16),
        tokio::runtime::Handle::current(),
    )
}

#[tokio::test]
async fn test_one_enumeration_per_cache_miss() {
    let mut service = MockEnumerator::new();
    service
        .expect_enumerate()
        .withf(|device, _| device == &DeviceKey::new("a"))
        .times(1)
        .returning(|_, progress| {
            progress.report(2, 2, true);
            Ok(vec![7, 8])
        });
    service.expect_cancel().never();

    let orchestrator = orchestrator_with(service);

    let first = orchestrator.request(DeviceKey::new("a"), false);
    assert_eq!(first.finished().await, Some(SessionStatus::Completed));

    let second = orchestrator.request(DeviceKey::new("a"), false);
    assert!(matches!(second, LoadTicket::Cached { count: 2, .. }));

    assert!(orchestrator.teardown().is_none());
    assert_eq!(orchestrator.state().read(|s| s.result_count()), 2);
}

#[tokio::test]
async fn test_single_device_key_is_passed_through() {
    let mut service = MockEnumerator::new();
    service
        .expect_enumerate()
        .withf(|device, _| device.is_single_device())
        .times(1)
        .returning(|_, _| Ok(Vec::new()));

    let orchestrator = orchestrator_with(service);

    let ticket = orchestrator
        .on_device_selection_changed(Some(DeviceKey::single_device()))
        .expect("ticket");
    assert_eq!(ticket.finished().await, Some(SessionStatus::Completed));
    assert_eq!(orchestrator.cached_devices(), vec![DeviceKey::single_device()]);
}

#[tokio::test]
async fn test_backend_error_counts_as_failure() {
    let mut service = MockEnumerator::new();
    service
        .expect_enumerate()
        .times(1)
        .returning(|_, _| Err(EnumerationError::PackageList("adb exited with code 1".to_string())));

    let orchestrator = orchestrator_with(service);

    let ticket = orchestrator.request(DeviceKey::new("a"), false);
    assert_eq!(ticket.finished().await, Some(SessionStatus::Failed));
    assert_eq!(
        orchestrator
            .metrics()
            .sessions_failed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

/// Service that answers immediately
struct ReadyService;

#[async_trait]
impl EnumerationService for ReadyService {
    type Record = u32;

    async fn enumerate(&self, _device: &DeviceKey, _progress: ProgressSink) -> Result<Vec<u32>, EnumerationError> {
        Ok(vec![1, 2])
    }

    async fn cancel(&self) -> Result<(), EnumerationError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Request { device: u8, force: bool },
    Select(Option<u8>),
    Teardown,
    ClearAll,
    /// Let spawned sessions complete
    Settle,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..3, any::<bool>()).prop_map(|(device, force)| Op::Request { device, force }),
        2 => proptest::option::of(0u8..3).prop_map(Op::Select),
        1 => Just(Op::Teardown),
        1 => Just(Op::ClearAll),
        2 => Just(Op::Settle),
    ]
}

fn device(index: u8) -> DeviceKey {
    DeviceKey::new(format!("device-{}", index))
}

fn check_ticket(ticket: &LoadTicket, before: u64, after: u64) -> Result<(), TestCaseError> {
    match ticket {
        LoadTicket::Started(handle) => {
            prop_assert_eq!(after, before + 1);
            prop_assert_eq!(handle.generation(), after);
        }
        LoadTicket::Cached { .. } => prop_assert_eq!(after, before + 1),
        LoadTicket::InFlight { generation } => {
            prop_assert_eq!(after, before);
            prop_assert_eq!(*generation, before);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn generation_advances_once_per_attempt(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let orchestrator: LoadOrchestrator<u32> = LoadOrchestrator::new(
                Arc::new(ReadyService),
                ProgressChannel::new(16),
                tokio::runtime::Handle::current(),
            );

            for op in ops {
                let before = orchestrator.current_generation();
                match op {
                    Op::Request { device: index, force } => {
                        let ticket = orchestrator.request(device(index), force);
                        check_ticket(&ticket, before, orchestrator.current_generation())?;
                    }
                    Op::Select(Some(index)) => {
                        let ticket = orchestrator.on_device_selection_changed(Some(device(index)));
                        prop_assert!(ticket.is_some());
                        if let Some(ticket) = ticket {
                            check_ticket(&ticket, before, orchestrator.current_generation())?;
                        }
                    }
                    Op::Select(None) => {
                        prop_assert!(orchestrator.on_device_selection_changed(None).is_none());
                        prop_assert_eq!(orchestrator.current_generation(), before + 1);
                        prop_assert!(orchestrator.cached_devices().is_empty());
                    }
                    Op::Teardown => {
                        orchestrator.teardown();
                        prop_assert_eq!(orchestrator.current_generation(), before + 1);
                        prop_assert!(orchestrator.active_session().is_none());
                    }
                    Op::ClearAll => {
                        orchestrator.clear_all();
                        prop_assert_eq!(orchestrator.current_generation(), before);
                    }
                    Op::Settle => {
                        for _ in 0..5 {
                            tokio::task::yield_now().await;
                        }
                        prop_assert_eq!(orchestrator.current_generation(), before);
                    }
                }

                // Visible records always belong to a cached device
                let visible = orchestrator.state().read(|s| s.loaded_device.clone());
                if let Some(visible) = visible {
                    prop_assert!(orchestrator.cached(&visible).is_some());
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
