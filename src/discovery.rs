//! Inquiry scan results

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::event_stream::{EventSink, EventStream};
use crate::platform::{BluetoothRadio, PermissionAuthority, RemoteDevice};
use crate::{DeviceInfo, DiscoveredDevice, Error, Result};

struct DiscoveryInner {
    radio: Arc<dyn BluetoothRadio>,
    permissions: Arc<dyn PermissionAuthority>,
    observing: Mutex<bool>,
    sink: EventSink<DiscoveredDevice>,
}

impl DiscoveryInner {
    fn stop_observing(&self) -> bool {
        let was_observing = std::mem::replace(&mut *self.observing.lock().unwrap(), false);
        if was_observing {
            debug!("unregistered discovery observers");
        }
        if !self.radio.cancel_discovery() {
            warn!("failed to cancel discovery");
        }
        was_observing
    }
}

/// Publishes inquiry scan results to a single subscriber.
///
/// Results are not deduplicated; a device seen twice is published twice.
#[derive(Clone)]
pub struct DiscoveryBroadcaster {
    inner: Arc<DiscoveryInner>,
}

impl std::fmt::Debug for DiscoveryBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryBroadcaster")
            .field("active", &self.is_active())
            .finish()
    }
}

impl DiscoveryBroadcaster {
    /// Creates a broadcaster that scans with `radio` once `permissions` allows it.
    pub fn new(radio: Arc<dyn BluetoothRadio>, permissions: Arc<dyn PermissionAuthority>) -> Self {
        DiscoveryBroadcaster {
            inner: Arc::new(DiscoveryInner {
                radio,
                permissions,
                observing: Mutex::new(false),
                sink: EventSink::new(),
            }),
        }
    }

    /// Starts an inquiry scan and returns the stream of devices it finds.
    ///
    /// The stream ends when the scan finishes or is cancelled. Dropping the stream cancels the scan. Starting again
    /// while a scan is running replaces the previous stream.
    pub async fn start(&self) -> Result<EventStream<DiscoveredDevice>> {
        if !self.inner.permissions.ensure_location_permission().await {
            return Err(Error::new(
                ErrorKind::NoPermissions,
                None,
                "discovering other devices requires location access permission",
            ));
        }

        let weak = Arc::downgrade(&self.inner);
        let stream = self.inner.sink.subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                debug!("discovery stream cancelled");
                inner.stop_observing();
            }
        });
        *self.inner.observing.lock().unwrap() = true;
        info!("registered discovery observers");

        if !self.inner.radio.start_discovery() {
            self.inner.sink.close();
            self.inner.stop_observing();
            return Err(Error::new(
                ErrorKind::BluetoothUnavailable,
                None,
                "the radio refused to start discovery",
            ));
        }
        Ok(stream)
    }

    /// Publishes a device reported by the scan. Returns `false` if no scan is being observed.
    pub fn on_device_found(&self, device: &dyn RemoteDevice, rssi: Option<i16>) -> bool {
        if !self.is_active() {
            return false;
        }
        let found = DiscoveredDevice {
            device: DeviceInfo::from_device(device),
            rssi,
        };
        debug!("discovered {}", found.device.address);
        self.inner.sink.publish(found)
    }

    /// Ends the stream of the finished scan.
    pub fn on_discovery_finished(&self) {
        if self.inner.stop_observing() {
            info!("discovery finished");
            self.inner.sink.close();
        }
    }

    /// Cancels the scan and ends its stream. Does nothing if no scan is running.
    pub fn cancel(&self) {
        self.inner.sink.close();
        self.inner.stop_observing();
    }

    /// Whether a scan is being observed
    pub fn is_active(&self) -> bool {
        *self.inner.observing.lock().unwrap()
    }
}
