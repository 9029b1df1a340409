#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rfcomm_bridge::pairing::{DecisionUnavailable, PairingBroadcast};
use rfcomm_bridge::platform::{BluetoothRadio, PermissionAuthority, RemoteDevice, SerialConnection, SerialConnector};
use rfcomm_bridge::registry::ConnectionListener;
use rfcomm_bridge::{
    Adapter, AdapterConfig, Address, BondState, ConnectionId, DeviceClass, PairingAuthority, PairingDecision,
    PairingRequest, PowerState, Uuid,
};
use tracing::metadata::LevelFilter;

pub fn init_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

pub fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

pub struct MockDevice {
    pub address: Address,
    pub name: Option<String>,
    pub class: DeviceClass,
    pub connected: Option<bool>,
    pub bond_state: Mutex<BondState>,
    pub accept_bond: AtomicBool,
    pub bond_requests: AtomicUsize,
    pub fail_unbond: AtomicBool,
    pub fail_set_pin: AtomicBool,
    pub pins: Mutex<Vec<Vec<u8>>>,
    pub confirmations: Mutex<Vec<bool>>,
}

impl MockDevice {
    pub fn new(address: &str) -> Self {
        MockDevice {
            address: addr(address),
            name: Some(format!("device {address}")),
            class: DeviceClass::Classic,
            connected: None,
            bond_state: Mutex::new(BondState::None),
            accept_bond: AtomicBool::new(true),
            bond_requests: AtomicUsize::new(0),
            fail_unbond: AtomicBool::new(false),
            fail_set_pin: AtomicBool::new(false),
            pins: Mutex::new(Vec::new()),
            confirmations: Mutex::new(Vec::new()),
        }
    }
}

impl RemoteDevice for MockDevice {
    fn address(&self) -> Address {
        self.address.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn device_class(&self) -> DeviceClass {
        self.class
    }

    fn bond_state(&self) -> BondState {
        *self.bond_state.lock().unwrap()
    }

    fn create_bond(&self) -> bool {
        self.bond_requests.fetch_add(1, Ordering::SeqCst);
        self.accept_bond.load(Ordering::SeqCst)
    }

    fn remove_bond(&self) -> io::Result<bool> {
        if self.fail_unbond.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "removeBond refused"));
        }
        *self.bond_state.lock().unwrap() = BondState::None;
        Ok(true)
    }

    fn set_pin(&self, pin: &[u8]) -> io::Result<()> {
        if self.fail_set_pin.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "setPin failed"));
        }
        self.pins.lock().unwrap().push(pin.to_vec());
        Ok(())
    }

    fn set_pairing_confirmation(&self, confirm: bool) -> io::Result<()> {
        self.confirmations.lock().unwrap().push(confirm);
        Ok(())
    }

    fn is_connected(&self) -> Option<bool> {
        self.connected
    }
}

pub struct MockRadio {
    pub power: Mutex<PowerState>,
    pub discovering: AtomicBool,
    pub refuse_discovery: AtomicBool,
    pub discovery_starts: AtomicUsize,
    pub discovery_cancels: AtomicUsize,
    pub devices: Mutex<HashMap<Address, Arc<MockDevice>>>,
    pub bonded: Mutex<Vec<Address>>,
}

impl Default for MockRadio {
    fn default() -> Self {
        MockRadio {
            power: Mutex::new(PowerState::On),
            discovering: AtomicBool::new(false),
            refuse_discovery: AtomicBool::new(false),
            discovery_starts: AtomicUsize::new(0),
            discovery_cancels: AtomicUsize::new(0),
            devices: Mutex::new(HashMap::new()),
            bonded: Mutex::new(Vec::new()),
        }
    }
}

impl MockRadio {
    pub fn device(&self, address: &str) -> Arc<MockDevice> {
        self.devices
            .lock()
            .unwrap()
            .entry(addr(address))
            .or_insert_with(|| Arc::new(MockDevice::new(address)))
            .clone()
    }
}

impl BluetoothRadio for MockRadio {
    fn is_enabled(&self) -> bool {
        *self.power.lock().unwrap() == PowerState::On
    }

    fn state(&self) -> PowerState {
        *self.power.lock().unwrap()
    }

    fn enable(&self) -> bool {
        *self.power.lock().unwrap() = PowerState::On;
        true
    }

    fn disable(&self) -> bool {
        *self.power.lock().unwrap() = PowerState::Off;
        true
    }

    fn address(&self) -> Option<String> {
        Some("02:00:00:00:00:00".into())
    }

    fn name(&self) -> Option<String> {
        Some("mock radio".into())
    }

    fn set_name(&self, _name: &str) -> bool {
        true
    }

    fn start_discovery(&self) -> bool {
        self.discovery_starts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_discovery.load(Ordering::SeqCst) {
            return false;
        }
        self.discovering.store(true, Ordering::SeqCst);
        true
    }

    fn cancel_discovery(&self) -> bool {
        self.discovery_cancels.fetch_add(1, Ordering::SeqCst);
        self.discovering.store(false, Ordering::SeqCst);
        true
    }

    fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    fn bonded_devices(&self) -> Vec<Arc<dyn RemoteDevice>> {
        let bonded = self.bonded.lock().unwrap().clone();
        bonded
            .iter()
            .map(|address| self.device(address.as_str()) as Arc<dyn RemoteDevice>)
            .collect()
    }

    fn remote_device(&self, address: &Address) -> Arc<dyn RemoteDevice> {
        self.device(address.as_str())
    }
}

/// The state shared between a [`MockLink`] and the test.
pub struct LinkState {
    pub address: Address,
    pub service: Uuid,
    pub listener: ConnectionListener,
    pub written: Mutex<Vec<Vec<u8>>>,
    pub disconnects: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub fail_disconnect: AtomicBool,
    /// Writes block while this is set.
    pub hold_writes: AtomicBool,
}

struct MockLink(Arc<LinkState>);

impl SerialConnection for MockLink {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        while self.0.hold_writes.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "Broken pipe"));
        }
        self.0.written.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn disconnect(&self) -> io::Result<()> {
        self.0.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_disconnect.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "boom"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub unreachable: Mutex<HashSet<Address>>,
    pub links: Mutex<Vec<Arc<LinkState>>>,
}

impl MockConnector {
    pub fn link(&self, id: ConnectionId) -> Arc<LinkState> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|link| link.listener.id() == id)
            .cloned()
            .unwrap()
    }
}

impl SerialConnector for MockConnector {
    fn connect(
        &self,
        address: &Address,
        service: Uuid,
        listener: ConnectionListener,
    ) -> io::Result<Box<dyn SerialConnection>> {
        if self.unreachable.lock().unwrap().contains(address) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "read failed, socket might closed or timeout, read ret: -1",
            ));
        }
        let link = Arc::new(LinkState {
            address: address.clone(),
            service,
            listener,
            written: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            hold_writes: AtomicBool::new(false),
        });
        self.links.lock().unwrap().push(link.clone());
        Ok(Box::new(MockLink(link)))
    }
}

pub struct Permissions(pub AtomicBool);

#[async_trait]
impl PermissionAuthority for Permissions {
    async fn ensure_location_permission(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Answers every decision with a fixed script and records what it was asked.
#[derive(Default)]
pub struct ScriptedAuthority {
    pub answer: Mutex<Option<Result<PairingDecision, DecisionUnavailable>>>,
    pub never_answer: AtomicBool,
    pub asked: Mutex<Vec<PairingRequest>>,
    pub notified: Mutex<Vec<PairingRequest>>,
}

impl ScriptedAuthority {
    pub fn answering(answer: Result<PairingDecision, DecisionUnavailable>) -> Self {
        ScriptedAuthority {
            answer: Mutex::new(Some(answer)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PairingAuthority for ScriptedAuthority {
    async fn decide(&self, request: &PairingRequest) -> Result<PairingDecision, DecisionUnavailable> {
        self.asked.lock().unwrap().push(request.clone());
        if self.never_answer.load(Ordering::SeqCst) {
            futures_lite::future::pending::<()>().await;
        }
        self.answer.lock().unwrap().clone().unwrap_or(Ok(PairingDecision::Defer))
    }

    fn notify(&self, request: &PairingRequest) {
        self.notified.lock().unwrap().push(request.clone());
    }
}

#[derive(Default)]
pub struct BroadcastLog {
    pub aborts: AtomicUsize,
    pub launches: AtomicUsize,
    pub finishes: AtomicUsize,
}

impl BroadcastLog {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.aborts.load(Ordering::SeqCst),
            self.launches.load(Ordering::SeqCst),
            self.finishes.load(Ordering::SeqCst),
        )
    }
}

pub struct MockBroadcast(pub Arc<BroadcastLog>);

impl PairingBroadcast for MockBroadcast {
    fn abort(&mut self) {
        self.0.aborts.fetch_add(1, Ordering::SeqCst);
    }

    fn launch_system_ui(&mut self) {
        self.0.launches.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(self: Box<Self>) {
        self.0.finishes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Platform {
    pub radio: Arc<MockRadio>,
    pub connector: Arc<MockConnector>,
    pub permissions: Arc<Permissions>,
    pub authority: Arc<ScriptedAuthority>,
}

impl Platform {
    pub fn new() -> Self {
        init_tracing();
        Platform {
            radio: Arc::new(MockRadio::default()),
            connector: Arc::new(MockConnector::default()),
            permissions: Arc::new(Permissions(AtomicBool::new(true))),
            authority: Arc::new(ScriptedAuthority::default()),
        }
    }

    pub fn adapter(&self) -> Adapter {
        Adapter::new(
            AdapterConfig::new(self.radio.clone(), self.connector.clone())
                .permissions(self.permissions.clone())
                .pairing_authority(self.authority.clone()),
        )
    }
}
