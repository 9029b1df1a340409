//! Serial connection identifiers and bookkeeping

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event_stream::EventSink;
use crate::platform::{SerialConnection, SerialConnector};
use crate::registry::ConnectionListener;
use crate::Address;

/// Identifies a serial connection.
///
/// Identifiers are positive, assigned in increasing order and never reused for the lifetime of the process, even
/// after the connection they named has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ConnectionId(pub(crate) u32);

impl ConnectionId {
    /// The numeric value of this identifier
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ConnectionId {
    fn from(id: u32) -> Self {
        ConnectionId(id)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle of a serial connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// The RFCOMM connect is in progress
    Connecting,
    /// The connection is established
    Open,
    /// The connection is being torn down
    Closing,
    /// The connection is closed and has left the registry
    Closed,
}

/// A snapshot of a connection's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionInfo {
    /// The connection's identifier
    pub id: ConnectionId,
    /// The address of the peer
    pub address: Address,
    /// The connection's state when the snapshot was taken
    pub state: ConnectionState,
}

pub(crate) struct WriteJob {
    pub bytes: Vec<u8>,
    pub reply: Sender<std::io::Result<()>>,
}

pub(crate) type ConnectResult = std::io::Result<Arc<dyn SerialConnection>>;

pub(crate) struct ConnectionHandle {
    pub id: ConnectionId,
    pub address: Address,
    pub state: ConnectionState,
    pub connection: Option<Arc<dyn SerialConnection>>,
    pub jobs: Sender<WriteJob>,
    pub reader: EventSink<Vec<u8>>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, address: Address, jobs: Sender<WriteJob>) -> Self {
        ConnectionHandle {
            id,
            address,
            state: ConnectionState::Connecting,
            connection: None,
            jobs,
            reader: EventSink::new(),
        }
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            address: self.address.clone(),
            state: self.state,
        }
    }

    /// Releases the OS connection and ends the subscriber's stream. Disconnect failures are logged, never returned,
    /// so that a sweep over many handles always completes.
    pub fn shutdown(mut self) -> ConnectionInfo {
        self.state = ConnectionState::Closing;
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.disconnect() {
                warn!("failed to disconnect connection {} from {}: {e}", self.id, self.address);
            }
        }
        self.reader.close();
        self.state = ConnectionState::Closed;
        debug!("closed connection {} to {}", self.id, self.address);
        self.info()
    }
}

pub(crate) struct Worker {
    pub connector: Arc<dyn SerialConnector>,
    pub address: Address,
    pub service: Uuid,
    pub listener: ConnectionListener,
    pub connected: Sender<ConnectResult>,
    pub unclaimed: Receiver<ConnectResult>,
    pub jobs: Receiver<WriteJob>,
}

impl Worker {
    // Native RFCOMM sockets only offer blocking calls, so each connection gets a thread that performs the connect and
    // then every write, one at a time. The loop ends once the handle (and with it the job sender) is gone.
    //
    // `unclaimed` is the worker's own end of the result channel. If the opener went away before taking the
    // connection, it is still queued there when the loop ends and the worker hangs it up.
    pub fn run(self) {
        let Worker {
            connector,
            address,
            service,
            listener,
            connected,
            unclaimed,
            jobs,
        } = self;
        let id = listener.id();
        debug!("connection {id} worker running");

        let connection: Arc<dyn SerialConnection> = match connector.connect(&address, service, listener) {
            Ok(connection) => Arc::from(connection),
            Err(e) => {
                let _ = connected.send_blocking(Err(e));
                return;
            }
        };

        if connected.send_blocking(Ok(connection.clone())).is_err() {
            return;
        }

        while let Ok(job) = jobs.recv_blocking() {
            let result = connection.write(&job.bytes);
            let _ = job.reply.send_blocking(result);
        }

        if let Ok(Ok(abandoned)) = unclaimed.try_recv() {
            debug!("connection {id} was never claimed");
            if let Err(e) = abandoned.disconnect() {
                warn!("failed to disconnect abandoned connection {id}: {e}");
            }
        }

        debug!("connection {id} worker exiting");
    }
}
