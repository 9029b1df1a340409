//! The adapter facade and its configuration

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::bonding::BondCoordinator;
use crate::btuuid::service_classes;
use crate::connection::{ConnectionId, ConnectionInfo};
use crate::discovery::DiscoveryBroadcaster;
use crate::error::ErrorKind;
use crate::event_stream::EventStream;
use crate::monitor::AdapterStateMonitor;
use crate::pairing::{
    PairingAuthority, PairingBroadcast, PairingCoordinator, PairingState, PairingVariant, SystemPairingUi,
};
use crate::platform::{BluetoothRadio, PermissionAuthority, PermissionsGranted, RemoteDevice, SerialConnector};
use crate::registry::ConnectionRegistry;
use crate::{
    Address, AdapterState, BondState, DeviceInfo, DiscoveredDevice, Error, PlatformEvent, PowerState, Result,
};

/// The capabilities and settings an [`Adapter`] is built from.
pub struct AdapterConfig {
    radio: Option<Arc<dyn BluetoothRadio>>,
    connector: Arc<dyn SerialConnector>,
    permissions: Arc<dyn PermissionAuthority>,
    pairing_authority: Arc<dyn PairingAuthority>,
    service: Uuid,
}

impl AdapterConfig {
    /// Creates a config for the host's radio.
    ///
    /// Connections are made to the serial port service. No runtime permissions are requested and pairing requests
    /// are left to the system pairing UI unless configured otherwise.
    pub fn new(radio: Arc<dyn BluetoothRadio>, connector: Arc<dyn SerialConnector>) -> Self {
        AdapterConfig {
            radio: Some(radio),
            ..AdapterConfig::without_radio(connector)
        }
    }

    /// Creates a config for a host without a Bluetooth radio. Every operation of the resulting adapter fails with
    /// [`BluetoothUnavailable`][ErrorKind::BluetoothUnavailable].
    pub fn without_radio(connector: Arc<dyn SerialConnector>) -> Self {
        AdapterConfig {
            radio: None,
            connector,
            permissions: Arc::new(PermissionsGranted),
            pairing_authority: Arc::new(SystemPairingUi),
            service: service_classes::SERIAL_PORT,
        }
    }

    /// Sets the authority consulted before scanning for devices.
    #[must_use]
    pub fn permissions(mut self, permissions: Arc<dyn PermissionAuthority>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Sets the authority answering pairing requests.
    #[must_use]
    pub fn pairing_authority(mut self, authority: Arc<dyn PairingAuthority>) -> Self {
        self.pairing_authority = authority;
        self
    }

    /// Sets the RFCOMM service connections are made to.
    #[must_use]
    pub fn service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("has_radio", &self.radio.is_some())
            .field("service", &self.service)
            .finish()
    }
}

struct AdapterInner {
    radio: Arc<dyn BluetoothRadio>,
    permissions: Arc<dyn PermissionAuthority>,
    registry: ConnectionRegistry,
    monitor: AdapterStateMonitor,
    discovery: DiscoveryBroadcaster,
    pairing: PairingCoordinator,
    bonds: BondCoordinator,
}

/// The host's Bluetooth adapter as seen by the application.
///
/// Cloning an `Adapter` yields another handle to the same connections, streams and pairing state.
#[derive(Clone)]
pub struct Adapter {
    inner: Option<Arc<AdapterInner>>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("Adapter")
                .field("state", &inner.monitor.current())
                .field("registry", &inner.registry)
                .finish(),
            None => f.write_str("Adapter(unavailable)"),
        }
    }
}

fn unavailable() -> Error {
    Error::new(ErrorKind::BluetoothUnavailable, None, "bluetooth is not available")
}

impl Adapter {
    /// Creates an adapter from `config`.
    pub fn new(config: AdapterConfig) -> Self {
        let Some(radio) = config.radio else {
            info!("no bluetooth radio on this host");
            return Adapter { inner: None };
        };

        let registry = ConnectionRegistry::new(config.connector, config.service);
        let initial = AdapterState {
            power: radio.state(),
            discovering: radio.is_discovering(),
        };
        let monitor = AdapterStateMonitor::new(registry.clone(), initial);
        let discovery = DiscoveryBroadcaster::new(radio.clone(), config.permissions.clone());

        Adapter {
            inner: Some(Arc::new(AdapterInner {
                radio,
                permissions: config.permissions,
                registry,
                monitor,
                discovery,
                pairing: PairingCoordinator::new(config.pairing_authority),
                bonds: BondCoordinator::new(),
            })),
        }
    }

    fn inner(&self) -> Result<&AdapterInner> {
        self.inner.as_deref().ok_or_else(unavailable)
    }

    /// Whether the host has a Bluetooth radio
    pub fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether the radio is powered on
    pub fn is_enabled(&self) -> Result<bool> {
        Ok(self.inner()?.radio.is_enabled())
    }

    /// The power state as currently reported by the radio
    pub fn state(&self) -> Result<PowerState> {
        Ok(self.inner()?.radio.state())
    }

    /// The adapter state as last observed through [`handle_event`][Self::handle_event]
    pub fn adapter_state(&self) -> Result<AdapterState> {
        Ok(self.inner()?.monitor.current())
    }

    /// Asks for the radio to be powered on. Returns whether it is on or the request was accepted.
    pub fn request_enable(&self) -> Result<bool> {
        let radio = &self.inner()?.radio;
        if radio.is_enabled() {
            return Ok(true);
        }
        info!("requesting to enable bluetooth");
        Ok(radio.enable())
    }

    /// Asks for the radio to be powered off. Returns whether it was on.
    pub fn request_disable(&self) -> Result<bool> {
        let radio = &self.inner()?.radio;
        if !radio.is_enabled() {
            return Ok(false);
        }
        info!("requesting to disable bluetooth");
        radio.disable();
        Ok(true)
    }

    /// The address of the local radio, if the platform exposes it
    pub fn address(&self) -> Result<Option<String>> {
        Ok(self.inner()?.radio.address())
    }

    /// The user visible name of the local radio
    pub fn name(&self) -> Result<Option<String>> {
        Ok(self.inner()?.radio.name())
    }

    /// Renames the local radio. Returns `false` if the OS refused.
    pub fn set_name(&self, name: &str) -> Result<bool> {
        Ok(self.inner()?.radio.set_name(name))
    }

    /// Whether an inquiry scan is running
    pub fn is_discovering(&self) -> Result<bool> {
        Ok(self.inner()?.radio.is_discovering())
    }

    /// Whether the local radio is discoverable by other devices
    pub fn is_discoverable(&self) -> Result<bool> {
        Ok(self.inner()?.radio.is_discoverable())
    }

    /// Makes sure the permissions needed for discovery are granted, prompting the user if needed.
    pub async fn ensure_permissions(&self) -> Result<bool> {
        Ok(self.inner()?.permissions.ensure_location_permission().await)
    }

    /// A stream of radio power state changes.
    ///
    /// There is at most one listener; calling this again ends the previous stream.
    pub fn events(&self) -> Result<EventStream<PowerState>> {
        Ok(self.inner()?.monitor.events())
    }

    /// The bonding state of the device at `address`
    pub fn device_bond_state(&self, address: &Address) -> Result<BondState> {
        Ok(self.inner()?.radio.remote_device(address).bond_state())
    }

    /// All devices bonded with this host.
    ///
    /// Fails with [`NoPermissions`][ErrorKind::NoPermissions] if the location permission is denied.
    pub async fn bonded_devices(&self) -> Result<Vec<DeviceInfo>> {
        let inner = self.inner()?;
        if !inner.permissions.ensure_location_permission().await {
            return Err(Error::new(
                ErrorKind::NoPermissions,
                None,
                "listing bonded devices requires location access permission",
            ));
        }
        Ok(inner
            .radio
            .bonded_devices()
            .iter()
            .map(|device| DeviceInfo {
                bond_state: BondState::Bonded,
                ..DeviceInfo::from_device(&**device)
            })
            .collect())
    }

    /// Bonds with the device at `address`. See [`BondCoordinator::bond`].
    pub async fn bond_device(&self, address: &Address) -> Result<bool> {
        let inner = self.inner()?;
        let device = inner.radio.remote_device(address);
        inner.bonds.bond(device).await
    }

    /// Removes the bond with the device at `address`.
    pub fn remove_device_bond(&self, address: &Address) -> Result<bool> {
        let inner = self.inner()?;
        let device = inner.radio.remote_device(address);
        inner.bonds.unbond(&*device)
    }

    /// Starts answering pairing requests through the configured [`PairingAuthority`].
    ///
    /// Fails with [`LogicError`][ErrorKind::LogicError] if already enabled.
    pub fn enable_pairing_requests(&self) -> Result<()> {
        self.inner()?.pairing.enable()
    }

    /// Stops answering pairing requests. Does nothing if not enabled.
    pub fn disable_pairing_requests(&self) -> Result<()> {
        self.inner()?.pairing.disable();
        Ok(())
    }

    /// Starts an inquiry scan. See [`DiscoveryBroadcaster::start`].
    pub async fn start_discovery(&self) -> Result<EventStream<DiscoveredDevice>> {
        self.inner()?.discovery.start().await
    }

    /// Cancels the inquiry scan and ends its stream. Does nothing if no scan is running.
    pub fn cancel_discovery(&self) -> Result<()> {
        self.inner()?.discovery.cancel();
        Ok(())
    }

    /// Opens a serial connection to the device at `address`. See [`ConnectionRegistry::open`].
    pub async fn connect(&self, address: Address) -> Result<ConnectionId> {
        self.inner()?.registry.open(address).await
    }

    /// Writes `bytes` to connection `id`.
    pub async fn write(&self, id: ConnectionId, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.inner()?.registry.write(id, bytes).await
    }

    /// Writes the UTF-8 encoding of `text` to connection `id`.
    pub async fn write_text(&self, id: ConnectionId, text: &str) -> Result<()> {
        self.write(id, text.as_bytes()).await
    }

    /// Closes connection `id`. Returns `false` if there was no such connection.
    pub fn close(&self, id: ConnectionId) -> Result<bool> {
        Ok(self.inner()?.registry.close(id))
    }

    /// The bytes received on connection `id`. See [`ConnectionRegistry::subscribe`].
    pub fn read_stream(&self, id: ConnectionId) -> Result<EventStream<Vec<u8>>> {
        self.inner()?.registry.subscribe(id)
    }

    /// Snapshots of all open connections
    pub fn connections(&self) -> Result<Vec<ConnectionInfo>> {
        Ok(self.inner()?.registry.connections())
    }

    /// Feeds an OS notification into the bridge.
    pub fn handle_event(&self, event: PlatformEvent) {
        let Some(inner) = self.inner.as_deref() else {
            debug!("ignoring {event:?} without a radio");
            return;
        };
        match event {
            PlatformEvent::AdapterStateChanged(power) => {
                inner.monitor.on_state_changed(power);
            }
            PlatformEvent::DiscoveryStarted => inner.monitor.set_discovering(true),
            PlatformEvent::DiscoveryFinished => {
                inner.monitor.set_discovering(false);
                inner.discovery.on_discovery_finished();
            }
            PlatformEvent::DeviceFound { device, rssi } => {
                inner.discovery.on_device_found(&*device, rssi);
            }
            PlatformEvent::BondStateChanged { address, state } => {
                inner.bonds.on_bond_state_changed(&address, state);
            }
        }
    }

    /// Handles an OS pairing request for `device`. See [`PairingCoordinator::handle`].
    ///
    /// Without a radio the request is ignored and `broadcast` is finished immediately.
    pub async fn handle_pairing_request(
        &self,
        device: Arc<dyn RemoteDevice>,
        variant: PairingVariant,
        pairing_key: Option<u32>,
        broadcast: Box<dyn PairingBroadcast>,
    ) -> PairingState {
        match self.inner.as_deref() {
            Some(inner) => inner.pairing.handle(device, variant, pairing_key, broadcast).await,
            None => {
                broadcast.finish();
                PairingState::Ignored
            }
        }
    }
}
