#![warn(missing_docs)]

//! rfcomm-bridge is the core of a bridge that exposes a host's Bluetooth Classic serial port (RFCOMM/SPP) stack to an
//! application framework through asynchronous calls and event streams.
//!
//! The crate contains no Bluetooth stack of its own. The host's radio, RFCOMM sockets and permission prompts are
//! provided by a platform layer implementing the traits in [`platform`], which also forwards OS notifications to
//! [`Adapter::handle_event`] and [`Adapter::handle_pairing_request`].
//!
//! # Usage
//!
//! ```rust,no_run
//!# use rfcomm_bridge::{Adapter, Address};
//!# use futures_lite::StreamExt;
//!# async fn run(adapter: Adapter) -> Result<(), Box<dyn std::error::Error>> {
//!let address: Address = "00:11:22:AA:BB:CC".parse()?;
//!let id = adapter.connect(address).await?;
//!let mut incoming = adapter.read_stream(id)?;
//!adapter.write_text(id, "AT\r\n").await?;
//!while let Some(bytes) = incoming.next().await {
//!    println!("{id}: {bytes:?}");
//!}
//!println!("{id} closed");
//!#
//!#    Ok(())
//!# }
//! ```
//!
//! # Overview
//!
//! - Serial connections:
//!   - [Connecting][Adapter::connect] to a device's serial port service, [writing][Adapter::write] and
//!     [reading][Adapter::read_stream] bytes, [closing][Adapter::close] the connection
//!   - Every connection is identified by a [`ConnectionId`] which is never reused while the process lives
//!   - All connections are closed when the radio powers off
//! - Discovery:
//!   - [Scanning][Adapter::start_discovery] for nearby devices
//!   - Listing [bonded devices][Adapter::bonded_devices]
//! - Pairing:
//!   - [Bonding][Adapter::bond_device] and [unbonding][Adapter::remove_device_bond]
//!   - [Answering pairing requests][Adapter::enable_pairing_requests] through a [`PairingAuthority`]
//! - Adapter state:
//!   - Power state [events][Adapter::events] and queries
//!
//! # Asynchronous runtimes
//!
//! The crate works with any asynchronous runtime. Blocking socket calls run on one worker thread per connection.
//!
//! # Feature flags
//!
//! The `serde` feature is available to enable serializing/deserializing addresses, connection identifiers and the
//! records published on event streams.

pub mod adapter;
pub mod address;
pub mod bonding;
pub mod btuuid;
pub mod connection;
pub mod discovery;
pub mod error;
mod event_stream;
pub mod monitor;
pub mod pairing;
pub mod platform;
pub mod registry;
mod util;

use std::sync::Arc;

pub use adapter::{Adapter, AdapterConfig};
pub use address::Address;
pub use btuuid::BluetoothUuidExt;
pub use connection::{ConnectionId, ConnectionInfo, ConnectionState};
pub use error::Error;
pub use event_stream::EventStream;
pub use pairing::{PairingAuthority, PairingBroadcast, PairingDecision, PairingRequest, PairingState, PairingVariant};
pub use uuid::Uuid;

use crate::platform::RemoteDevice;

/// Convenience alias for a result with [`Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Power state of the radio, as numbered by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum PowerState {
    /// The radio is off
    Off = 10,
    /// The radio is powering on
    TurningOn = 11,
    /// The radio is on and ready to use
    On = 12,
    /// The radio is powering off
    TurningOff = 13,
    /// A state this crate does not know about
    #[num_enum(catch_all)]
    Unknown(i32),
}

impl PowerState {
    /// The platform's numeric code for this state
    pub fn code(self) -> i32 {
        match self {
            PowerState::Off => 10,
            PowerState::TurningOn => 11,
            PowerState::On => 12,
            PowerState::TurningOff => 13,
            PowerState::Unknown(code) => code,
        }
    }

    /// Whether the radio is off or on its way there
    pub fn is_going_down(self) -> bool {
        matches!(self, PowerState::Off | PowerState::TurningOff)
    }
}

/// Bonding state of a remote device, as numbered by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum BondState {
    /// There is no bond with the device
    None = 10,
    /// Bonding is in progress
    Bonding = 11,
    /// The device is bonded
    Bonded = 12,
    /// A state this crate does not know about
    #[num_enum(catch_all)]
    Unknown(i32),
}

impl BondState {
    /// The platform's numeric code for this state
    pub fn code(self) -> i32 {
        match self {
            BondState::None => 10,
            BondState::Bonding => 11,
            BondState::Bonded => 12,
            BondState::Unknown(code) => code,
        }
    }
}

/// Transport type of a remote device, as numbered by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum DeviceClass {
    /// The type is not known
    #[num_enum(default)]
    Unknown = 0,
    /// Bluetooth Classic (BR/EDR)
    Classic = 1,
    /// Bluetooth Low Energy
    Le = 2,
    /// Both Classic and Low Energy
    Dual = 3,
}

impl DeviceClass {
    /// The platform's numeric code for this type
    pub fn code(self) -> i32 {
        self.into()
    }
}

/// The process-wide mirror of the radio state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdapterState {
    /// The radio power state
    pub power: PowerState,
    /// Whether an inquiry scan is running
    pub discovering: bool,
}

/// What the bridge reports about a remote device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// The device address
    pub address: Address,
    /// The user visible name, if known
    pub name: Option<String>,
    /// The transport type
    pub device_class: DeviceClass,
    /// Whether the device is connected to this host. Reported as `false` where the platform cannot tell.
    pub is_connected: bool,
    /// The bonding state
    pub bond_state: BondState,
}

impl DeviceInfo {
    pub(crate) fn from_device(device: &dyn RemoteDevice) -> Self {
        DeviceInfo {
            address: device.address(),
            name: device.name(),
            device_class: device.device_class(),
            is_connected: device.is_connected().unwrap_or(false),
            bond_state: device.bond_state(),
        }
    }
}

/// A device found by an inquiry scan
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredDevice {
    /// The device
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub device: DeviceInfo,
    /// The signal strength in dBm of the inquiry response
    pub rssi: Option<i16>,
}

/// Notifications the platform layer forwards from the OS to [`Adapter::handle_event`]
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// The radio power state changed
    AdapterStateChanged(PowerState),
    /// An inquiry scan started
    DiscoveryStarted,
    /// An inquiry scan finished
    DiscoveryFinished,
    /// An inquiry scan found a device
    DeviceFound {
        /// The device
        device: Arc<dyn RemoteDevice>,
        /// The signal strength in dBm, if reported
        rssi: Option<i16>,
    },
    /// The bond state of a device changed
    BondStateChanged {
        /// The device
        address: Address,
        /// Its new bond state
        state: BondState,
    },
}
