//! Capabilities the bridge consumes from the host's Bluetooth stack.
//!
//! The bridge contains no radio, RFCOMM or UI code of its own. A platform layer implements these traits on top of the
//! OS APIs and forwards OS notifications to [`Adapter::handle_event`][crate::Adapter::handle_event].
//!
//! Methods on [`SerialConnector`] and [`SerialConnection`] may block for as long as the underlying socket call does.
//! The bridge only calls them from its own per-connection worker threads, never from an async task, except for
//! [`SerialConnection::disconnect`] which must return promptly and unblock any pending write.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::registry::ConnectionListener;
use crate::{Address, BondState, DeviceClass, PowerState};

/// The host's Bluetooth radio.
pub trait BluetoothRadio: Send + Sync {
    /// Whether the radio is powered on
    fn is_enabled(&self) -> bool;

    /// The current power state of the radio
    fn state(&self) -> PowerState;

    /// Asks the OS to power the radio on. Returns `false` if the request was refused.
    fn enable(&self) -> bool;

    /// Asks the OS to power the radio off. Returns `false` if the request was refused.
    fn disable(&self) -> bool;

    /// The address of the local radio, if the OS exposes it
    fn address(&self) -> Option<String>;

    /// The user visible name of the local radio
    fn name(&self) -> Option<String>;

    /// Changes the user visible name of the local radio
    fn set_name(&self, name: &str) -> bool;

    /// Starts an inquiry scan. Results arrive as [`PlatformEvent::DeviceFound`][crate::PlatformEvent::DeviceFound].
    fn start_discovery(&self) -> bool;

    /// Cancels an inquiry scan. Must succeed when no scan is running.
    fn cancel_discovery(&self) -> bool;

    /// Whether an inquiry scan is running
    fn is_discovering(&self) -> bool;

    /// Whether the local radio is connectable and discoverable by other devices
    fn is_discoverable(&self) -> bool {
        false
    }

    /// All devices with a bonding record on this host
    fn bonded_devices(&self) -> Vec<Arc<dyn RemoteDevice>>;

    /// A handle to the remote device at `address`. This does not contact the device.
    fn remote_device(&self, address: &Address) -> Arc<dyn RemoteDevice>;
}

/// A remote Bluetooth device known to the OS.
pub trait RemoteDevice: Send + Sync {
    /// The device address
    fn address(&self) -> Address;

    /// The user visible name of the device, if known
    fn name(&self) -> Option<String>;

    /// The transport type of the device
    fn device_class(&self) -> DeviceClass;

    /// The current bonding state of the device
    fn bond_state(&self) -> BondState;

    /// Starts bonding with the device. Returns `false` if the OS refused to start.
    ///
    /// The outcome is reported later through
    /// [`PlatformEvent::BondStateChanged`][crate::PlatformEvent::BondStateChanged].
    fn create_bond(&self) -> bool;

    /// Removes the bonding record for the device.
    fn remove_bond(&self) -> std::io::Result<bool>;

    /// Answers a PIN pairing request.
    fn set_pin(&self, pin: &[u8]) -> std::io::Result<()>;

    /// Answers a passkey confirmation or consent pairing request.
    fn set_pairing_confirmation(&self, confirm: bool) -> std::io::Result<()>;

    /// Whether the device currently has a connection to this host.
    ///
    /// Not every platform can answer this; the default reports `None` which the bridge treats as not connected.
    fn is_connected(&self) -> Option<bool> {
        None
    }
}

impl std::fmt::Debug for dyn RemoteDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDevice").field("address", &self.address()).finish()
    }
}

/// Opens RFCOMM connections.
pub trait SerialConnector: Send + Sync {
    /// Connects to the RFCOMM service `service` on the device at `address`. Blocks until the connection is
    /// established or has failed.
    ///
    /// The platform reports inbound data and hangups for the new connection through `listener`, in arrival order.
    fn connect(
        &self,
        address: &Address,
        service: Uuid,
        listener: ConnectionListener,
    ) -> std::io::Result<Box<dyn SerialConnection>>;
}

/// An established RFCOMM connection.
pub trait SerialConnection: Send + Sync {
    /// Writes all of `bytes` to the connection. Blocks until the data has been handed to the OS.
    fn write(&self, bytes: &[u8]) -> std::io::Result<()>;

    /// Closes the connection. Calling this on an already closed connection is not an error.
    fn disconnect(&self) -> std::io::Result<()>;
}

/// Grants or denies the runtime permissions needed for discovery.
#[async_trait]
pub trait PermissionAuthority: Send + Sync {
    /// Ensures the location permission required to scan for devices is granted, prompting the user if needed.
    async fn ensure_location_permission(&self) -> bool;
}

/// A [`PermissionAuthority`] for hosts that need no runtime permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionsGranted;

#[async_trait]
impl PermissionAuthority for PermissionsGranted {
    async fn ensure_location_permission(&self) -> bool {
        true
    }
}
