mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{MockDevice, Platform};
use futures_lite::StreamExt;
use rfcomm_bridge::error::ErrorKind;
use rfcomm_bridge::platform::RemoteDevice;
use rfcomm_bridge::{BondState, DeviceClass, DiscoveredDevice, PlatformEvent};

fn found(device: Arc<MockDevice>, rssi: i16) -> PlatformEvent {
    let device: Arc<dyn RemoteDevice> = device;
    PlatformEvent::DeviceFound {
        device,
        rssi: Some(rssi),
    }
}

#[tokio::test]
async fn a_scan_publishes_every_result_then_ends() {
    let platform = Platform::new();
    let adapter = platform.adapter();
    let first = platform.radio.device("00:11:22:33:44:55");
    let second = platform.radio.device("66:77:88:99:AA:BB");

    let mut scan = adapter.start_discovery().await.unwrap();
    assert_eq!(platform.radio.discovery_starts.load(Ordering::SeqCst), 1);
    adapter.handle_event(PlatformEvent::DiscoveryStarted);
    assert!(adapter.adapter_state().unwrap().discovering);

    adapter.handle_event(found(first.clone(), -40));
    adapter.handle_event(found(second.clone(), -72));
    adapter.handle_event(PlatformEvent::DiscoveryFinished);

    let results: Vec<DiscoveredDevice> = (&mut scan).collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].device.address, first.address);
    assert_eq!(results[0].rssi, Some(-40));
    assert_eq!(results[1].device.name.as_deref(), Some("device 66:77:88:99:AA:BB"));
    assert_eq!(results[1].device.device_class, DeviceClass::Classic);
    assert_eq!(results[1].device.bond_state, BondState::None);
    assert!(!results[1].device.is_connected);
    assert!(!adapter.adapter_state().unwrap().discovering);

    // results after the scan finished go nowhere
    adapter.handle_event(found(first.clone(), -40));

    let mut again = adapter.start_discovery().await.unwrap();
    adapter.handle_event(found(first, -41));
    let result = again.next().await.unwrap();
    assert_eq!(result.rssi, Some(-41));
    assert_eq!(platform.radio.discovery_starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn results_are_not_deduplicated() {
    let platform = Platform::new();
    let adapter = platform.adapter();
    let device = platform.radio.device("00:11:22:33:44:55");

    let mut scan = adapter.start_discovery().await.unwrap();
    adapter.handle_event(found(device.clone(), -50));
    adapter.handle_event(found(device, -51));
    adapter.handle_event(PlatformEvent::DiscoveryFinished);

    assert_eq!((&mut scan).count().await, 2);
}

#[tokio::test]
async fn discovery_requires_location_permission() {
    let platform = Platform::new();
    platform.permissions.0.store(false, Ordering::SeqCst);
    let adapter = platform.adapter();

    let err = adapter.start_discovery().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoPermissions);
    assert_eq!(err.kind().code(), "no_permissions");
    assert_eq!(platform.radio.discovery_starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_refused_scan_is_an_error() {
    let platform = Platform::new();
    platform.radio.refuse_discovery.store(true, Ordering::SeqCst);
    let adapter = platform.adapter();

    let err = adapter.start_discovery().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BluetoothUnavailable);
    let device = platform.radio.device("00:11:22:33:44:55");
    adapter.handle_event(found(device, -30));
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_scan() {
    let platform = Platform::new();
    let adapter = platform.adapter();

    let scan = adapter.start_discovery().await.unwrap();
    assert!(platform.radio.discovering.load(Ordering::SeqCst));
    drop(scan);

    assert!(!platform.radio.discovering.load(Ordering::SeqCst));
    assert_eq!(platform.radio.discovery_cancels.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelling_ends_the_stream_and_is_idempotent() {
    let platform = Platform::new();
    let adapter = platform.adapter();
    let device = platform.radio.device("00:11:22:33:44:55");

    let mut scan = adapter.start_discovery().await.unwrap();
    adapter.cancel_discovery().unwrap();
    adapter.cancel_discovery().unwrap();
    adapter.handle_event(found(device, -30));

    assert_eq!(scan.next().await, None);
    assert!(!platform.radio.discovering.load(Ordering::SeqCst));
}

#[tokio::test]
async fn a_new_scan_replaces_the_previous_stream() {
    let platform = Platform::new();
    let adapter = platform.adapter();
    let device = platform.radio.device("00:11:22:33:44:55");

    let mut first = adapter.start_discovery().await.unwrap();
    let mut second = adapter.start_discovery().await.unwrap();
    adapter.handle_event(found(device, -30));

    assert_eq!(first.next().await, None);
    drop(first);
    assert!(second.next().await.is_some());
}

#[tokio::test]
async fn connection_status_is_reported_where_known() {
    let platform = Platform::new();
    let adapter = platform.adapter();
    let mut device = MockDevice::new("00:11:22:33:44:55");
    device.connected = Some(true);

    let mut scan = adapter.start_discovery().await.unwrap();
    adapter.handle_event(found(Arc::new(device), -30));

    assert!(scan.next().await.unwrap().device.is_connected);
}
