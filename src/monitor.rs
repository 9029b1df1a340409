//! Radio power state tracking

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::connection::ConnectionInfo;
use crate::event_stream::{EventSink, EventStream};
use crate::registry::ConnectionRegistry;
use crate::{AdapterState, PowerState};

struct MonitorInner {
    registry: ConnectionRegistry,
    state: Mutex<AdapterState>,
    sink: EventSink<PowerState>,
}

/// Keeps the [`AdapterState`] mirror in step with the radio and the connection set with the power state.
#[derive(Clone)]
pub struct AdapterStateMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for AdapterStateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AdapterStateMonitor").field(&self.current()).finish()
    }
}

impl AdapterStateMonitor {
    /// Creates a monitor starting from `initial` that sweeps `registry` on power-off.
    pub fn new(registry: ConnectionRegistry, initial: AdapterState) -> Self {
        AdapterStateMonitor {
            inner: Arc::new(MonitorInner {
                registry,
                state: Mutex::new(initial),
                sink: EventSink::new(),
            }),
        }
    }

    /// A stream of power state changes. Subscribing again replaces the previous listener.
    pub fn events(&self) -> EventStream<PowerState> {
        info!("registered adapter state observer");
        self.inner.sink.subscribe(|| debug!("unregistered adapter state observer"))
    }

    /// The mirrored adapter state
    pub fn current(&self) -> AdapterState {
        *self.inner.state.lock().unwrap()
    }

    /// Records a power state change.
    ///
    /// When the radio is going down every connection is closed before the listener hears about it. Returns the
    /// connections that were closed.
    pub fn on_state_changed(&self, power: PowerState) -> Vec<ConnectionInfo> {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.power = power;
            if power.is_going_down() {
                state.discovering = false;
            }
        }
        debug!("adapter state changed to {power:?}");

        let closed = if power.is_going_down() {
            self.inner.registry.teardown_all()
        } else {
            Vec::new()
        };
        self.inner.sink.publish(power);
        closed
    }

    /// Records whether an inquiry scan is running.
    pub fn set_discovering(&self, discovering: bool) {
        self.inner.state.lock().unwrap().discovering = discovering;
    }
}
