//! Unit tests for connection negotiation.

use super::*;
use crate::ble::mock::{MockTransport, notify, notify_write, read_only, write_only};
use crate::ble::uuid::{RFID_CHAR, RFID_CHAR_ALT, RFID_SERVICE};
use crate::ble::{ErrorKind, TransportError};
use crate::error::AppError;
use std::sync::Arc;

const INFO_SERVICE: &str = "0000180a-0000-1000-8000-00805f9b34fb";
const MODEL_CHAR: &str = "00002a24-0000-1000-8000-00805f9b34fb";
const SERIAL_CHAR: &str = "00002a25-0000-1000-8000-00805f9b34fb";
const VENDOR_SERVICE: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";
const VENDOR_CHAR: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

fn setup(transport: MockTransport) -> (Arc<MockTransport>, Arc<MemoryLinkStore>, ConnectionNegotiator) {
    setup_with_store(transport, MemoryLinkStore::new())
}

fn setup_with_store(
    transport: MockTransport,
    store: MemoryLinkStore,
) -> (Arc<MockTransport>, Arc<MemoryLinkStore>, ConnectionNegotiator) {
    let transport = Arc::new(transport);
    let store = Arc::new(store);
    let negotiator = ConnectionNegotiator::new(transport.clone(), store.clone());
    (transport, store, negotiator)
}

fn expect_link(outcome: NegotiationOutcome) -> LinkHandle {
    match outcome {
        NegotiationOutcome::Success(link) => link,
        NegotiationOutcome::Exhausted(failures) => panic!("negotiation exhausted: {failures:?}"),
    }
}

fn expect_failures(outcome: NegotiationOutcome) -> Vec<StrategyFailure> {
    match outcome {
        NegotiationOutcome::Exhausted(failures) => failures,
        NegotiationOutcome::Success(link) => panic!("unexpected link via {}", link.strategy),
    }
}

#[tokio::test]
async fn test_default_uuids_first() {
    let (transport, store, negotiator) = setup(MockTransport::new().with_service(RFID_SERVICE, &[(RFID_CHAR, notify_write())]));
    let device = transport.device();

    let link = expect_link(negotiator.negotiate(&device).await);

    assert_eq!(link.strategy, StrategyKind::DefaultUuids);
    assert_eq!(link.mode, LinkMode::Notify);
    assert!(transport.has_subscription());
    assert_eq!(transport.count_calls("on_disconnect"), 1);
    assert_eq!(negotiator.state(), NegotiationState::Connected(StrategyKind::DefaultUuids));
    assert_eq!(store.load().saved_pair(), Some((RFID_SERVICE, RFID_CHAR)));
}

#[tokio::test]
async fn test_quick_connect_wins_before_discovery() {
    let (transport, _store, negotiator) = setup(
        MockTransport::new()
            .with_service(RFID_SERVICE, &[(RFID_CHAR_ALT, notify())])
            .with_service(INFO_SERVICE, &[(MODEL_CHAR, read_only())]),
    );

    let link = expect_link(negotiator.negotiate(&transport.device()).await);

    assert_eq!(link.strategy, StrategyKind::QuickConnect);
    assert_eq!(link.strategy.label(), "Quick Connect");
    assert_eq!(link.characteristic.uuid, RFID_CHAR_ALT);
    // Auto-discover and brute force would have walked the info service
    assert_eq!(transport.count_calls(&format!("list_characteristics {INFO_SERVICE}")), 0);
}

#[tokio::test]
async fn test_saved_uuids_fail_fast_when_absent() {
    let (transport, _store, negotiator) = setup(MockTransport::new());

    let failures = expect_failures(negotiator.negotiate(&transport.device()).await);

    let order: Vec<_> = failures.iter().map(|f| f.strategy).collect();
    assert_eq!(order, StrategyKind::ORDER);
    assert_eq!(failures[1].message, "No saved UUIDs");
    // Every strategy but the saved one connects
    assert_eq!(transport.count_calls("connect"), 5);
    assert_eq!(negotiator.state(), NegotiationState::Exhausted);
}

#[tokio::test]
async fn test_saved_uuids_used_second() {
    let (transport, _store, negotiator) = setup_with_store(
        MockTransport::new().with_service(VENDOR_SERVICE, &[(VENDOR_CHAR, notify())]),
        MemoryLinkStore::with_pair("ffe0", "0000ffe1"),
    );

    let link = expect_link(negotiator.negotiate(&transport.device()).await);

    assert_eq!(link.strategy, StrategyKind::SavedUuids);
    assert_eq!(link.characteristic.uuid, VENDOR_CHAR);
}

#[tokio::test]
async fn test_auto_discover_prefers_notify_over_write() {
    let (transport, store, negotiator) = setup(
        MockTransport::new()
            .with_service(INFO_SERVICE, &[(MODEL_CHAR, write_only())])
            .with_service(VENDOR_SERVICE, &[(VENDOR_CHAR, notify())]),
    );

    let link = expect_link(negotiator.negotiate(&transport.device()).await);

    assert_eq!(link.strategy, StrategyKind::AutoDiscover);
    assert_eq!(link.characteristic.uuid, VENDOR_CHAR);
    assert_eq!(link.mode, LinkMode::Notify);
    assert_eq!(store.load().saved_pair(), Some((VENDOR_SERVICE, VENDOR_CHAR)));
}

#[tokio::test]
async fn test_auto_discover_falls_back_to_write() {
    let (transport, _store, negotiator) = setup(
        MockTransport::new()
            .with_service(VENDOR_SERVICE, &[(VENDOR_CHAR, notify()), (MODEL_CHAR, write_only())])
            .with_failing_subscribe(VENDOR_CHAR),
    );

    let link = expect_link(negotiator.negotiate(&transport.device()).await);

    assert_eq!(link.strategy, StrategyKind::AutoDiscover);
    assert_eq!(link.characteristic.uuid, MODEL_CHAR);
    assert_eq!(link.mode, LinkMode::WriteOnly);
    assert!(!link.is_subscribed());
}

#[tokio::test]
async fn test_brute_force_accepts_read_only() {
    let (transport, _store, negotiator) = setup(
        MockTransport::new()
            .with_service(INFO_SERVICE, &[(MODEL_CHAR, read_only()), (SERIAL_CHAR, read_only())])
            .with_failing_read(MODEL_CHAR),
    );

    let link = expect_link(negotiator.negotiate(&transport.device()).await);

    assert_eq!(link.strategy, StrategyKind::BruteForce);
    assert_eq!(link.characteristic.uuid, SERIAL_CHAR);
    assert_eq!(link.mode, LinkMode::Read);
}

#[tokio::test]
async fn test_default_subscription_failure_moves_on() {
    let (transport, _store, negotiator) = setup(
        MockTransport::new()
            .with_service(RFID_SERVICE, &[(RFID_CHAR, notify())])
            .with_failing_subscribe(RFID_CHAR),
    );

    let link = expect_link(negotiator.negotiate(&transport.device()).await);

    // Quick Connect keeps a link whose notifications cannot be enabled
    assert_eq!(link.strategy, StrategyKind::QuickConnect);
    assert_eq!(link.characteristic.uuid, RFID_CHAR);
    assert_eq!(link.mode, LinkMode::WriteOnly);
}

#[tokio::test]
async fn test_terminal_failure_ends_pass() {
    let (transport, _store, negotiator) = setup(
        MockTransport::new()
            .with_service(RFID_SERVICE, &[(RFID_CHAR, notify())])
            .with_connect_error(TransportError::new("NotAllowedError", "User denied access")),
    );

    let failures = expect_failures(negotiator.negotiate(&transport.device()).await);

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].strategy, StrategyKind::DefaultUuids);
    assert_eq!(failures[0].kind, ErrorKind::PermissionDenied);
    assert_eq!(transport.count_calls("connect"), 1);
}

#[tokio::test]
async fn test_failures_are_classified() {
    let (transport, _store, negotiator) = setup(
        MockTransport::new().with_connect_error(TransportError::new("NetworkError", "GATT operation failed")),
    );

    let failures = expect_failures(negotiator.negotiate(&transport.device()).await);

    assert_eq!(failures.len(), StrategyKind::ORDER.len());
    assert!(
        failures
            .iter()
            .filter(|f| f.strategy != StrategyKind::SavedUuids)
            .all(|f| f.kind == ErrorKind::GattNetwork)
    );
}

#[tokio::test]
async fn test_fresh_pass_restarts_from_first_strategy() {
    let (transport, _store, negotiator) = setup(MockTransport::new());
    let device = transport.device();

    expect_failures(negotiator.negotiate(&device).await);
    let failures = expect_failures(negotiator.negotiate(&device).await);

    assert_eq!(failures[0].strategy, StrategyKind::DefaultUuids);
    assert_eq!(transport.count_calls("connect"), 10);
}

#[tokio::test]
async fn test_link_carries_notifications_and_disconnect() {
    let (transport, _store, negotiator) = setup(MockTransport::new().with_service(RFID_SERVICE, &[(RFID_CHAR, notify())]));

    let mut link = expect_link(negotiator.negotiate(&transport.device()).await);

    transport.notify(&[0xA0, 0x03, 0x97, 0x1A]);
    assert_eq!(link.notifications.recv().await, Some(vec![0xA0, 0x03, 0x97, 0x1A]));

    transport.drop_link();
    assert!(link.disconnected.await.is_ok());
}

#[tokio::test]
async fn test_manual_connection_normalizes_and_saves() {
    let (transport, store, negotiator) = setup(MockTransport::new().with_service(VENDOR_SERVICE, &[(VENDOR_CHAR, notify())]));

    let link = negotiator
        .connect_manual(&transport.device(), "ffe0", "FFE1")
        .await
        .unwrap();

    assert_eq!(link.strategy, StrategyKind::Manual);
    assert_eq!(link.candidate().characteristic_uuid, VENDOR_CHAR);
    assert_eq!(store.load().saved_pair(), Some((VENDOR_SERVICE, VENDOR_CHAR)));
}

#[tokio::test]
async fn test_manual_connection_missing_characteristic() {
    let (transport, store, negotiator) = setup(MockTransport::new().with_service(VENDOR_SERVICE, &[(VENDOR_CHAR, notify())]));

    let result = negotiator.connect_manual(&transport.device(), "ffe0", "ffe9").await;

    assert!(matches!(
        result,
        Err(AppError::Transport {
            kind: ErrorKind::GattNotFound,
            ..
        })
    ));
    assert!(store.load().saved_pair().is_none());
}

#[tokio::test]
async fn test_manual_connection_requires_both_uuids() {
    let (transport, _store, negotiator) = setup(MockTransport::new());
    let result = negotiator.connect_manual(&transport.device(), "ffe0", " ").await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_single_quick_connect_stays_on_known_services() {
    let (transport, _store, negotiator) = setup(
        MockTransport::new()
            .with_service(INFO_SERVICE, &[(MODEL_CHAR, read_only()), (SERIAL_CHAR, notify())])
            .with_service(RFID_SERVICE, &[(RFID_CHAR, notify_write())]),
    );

    let link = negotiator
        .run_strategy(&transport.device(), StrategyKind::QuickConnect)
        .await
        .unwrap();

    assert_eq!(link.strategy, StrategyKind::QuickConnect);
    assert_eq!(link.characteristic.uuid, RFID_CHAR);
    assert_eq!(transport.count_calls("connect"), 1);
    assert_eq!(transport.count_calls("list_characteristics"), 1);
    assert_eq!(transport.count_calls(&format!("list_characteristics {INFO_SERVICE}")), 0);
    assert_eq!(negotiator.state(), NegotiationState::Connected(StrategyKind::QuickConnect));
}

#[tokio::test]
async fn test_single_quick_connect_failure_is_classified() {
    let (transport, store, negotiator) =
        setup(MockTransport::new().with_service(INFO_SERVICE, &[(SERIAL_CHAR, notify())]));

    let result = negotiator
        .run_strategy(&transport.device(), StrategyKind::QuickConnect)
        .await;

    assert!(matches!(
        result,
        Err(AppError::Transport {
            kind: ErrorKind::GattNotFound,
            ..
        })
    ));
    // No other strategy ran
    assert_eq!(transport.count_calls("connect"), 1);
    assert_eq!(transport.count_calls("list_characteristics"), 0);
    assert_eq!(negotiator.state(), NegotiationState::Exhausted);
    assert!(store.load().saved_pair().is_none());
    assert!(store.history().is_empty());
}

#[tokio::test]
async fn test_single_auto_discover_falls_back_to_write() {
    let (transport, _store, negotiator) =
        setup(MockTransport::new().with_service(VENDOR_SERVICE, &[(VENDOR_CHAR, write_only())]));

    let link = negotiator
        .run_strategy(&transport.device(), StrategyKind::AutoDiscover)
        .await
        .unwrap();

    assert_eq!(link.strategy, StrategyKind::AutoDiscover);
    assert_eq!(link.mode, LinkMode::WriteOnly);
    assert_eq!(transport.count_calls("connect"), 1);
}

#[tokio::test]
async fn test_single_strategy_rejects_manual() {
    let (transport, _store, negotiator) = setup(MockTransport::new());
    let result = negotiator.run_strategy(&transport.device(), StrategyKind::Manual).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_success_records_device_history() {
    let (transport, store, negotiator) =
        setup(MockTransport::new().with_service(RFID_SERVICE, &[(RFID_CHAR, notify_write())]));
    let device = transport.device();

    expect_link(negotiator.negotiate(&device).await);
    expect_link(negotiator.negotiate(&device).await);

    let history = store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history.entries()[0].name, "R6 PRO");
    assert_eq!(history.entries()[0].address, "dev-1");
}
