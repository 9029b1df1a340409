//! The connection registry

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::{ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionState, Worker, WriteJob};
use crate::error::ErrorKind;
use crate::event_stream::EventStream;
use crate::platform::SerialConnector;
use crate::util::defer;
use crate::{Address, Error, Result};

struct Table {
    last_id: u32,
    handles: HashMap<ConnectionId, ConnectionHandle>,
}

struct RegistryInner {
    connector: Arc<dyn SerialConnector>,
    service: Uuid,
    table: Mutex<Table>,
}

/// Owns every live serial connection and routes their traffic.
///
/// All membership changes go through a single lock, so identity assignment, removal and the power-off sweep never
/// interleave. Native I/O never runs under that lock.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("service", &self.inner.service)
            .field("connections", &self.len())
            .finish()
    }
}

fn unknown_connection() -> Error {
    Error::new(
        ErrorKind::InvalidArgument,
        None,
        "there is no connection with provided id",
    )
}

impl ConnectionRegistry {
    /// Creates an empty registry that connects to the RFCOMM service `service` using `connector`.
    pub fn new(connector: Arc<dyn SerialConnector>, service: Uuid) -> Self {
        ConnectionRegistry {
            inner: Arc::new(RegistryInner {
                connector,
                service,
                table: Mutex::new(Table {
                    last_id: 0,
                    handles: HashMap::new(),
                }),
            }),
        }
    }

    /// Opens a serial connection to `address` and returns its identifier once the connection is established.
    ///
    /// The connect runs on the connection's own worker thread. On failure the handle is discarded and the native error
    /// is returned as [`ConnectError`][ErrorKind::ConnectError]; there is no automatic retry. Dropping the returned
    /// future also discards the handle.
    pub async fn open(&self, address: Address) -> Result<ConnectionId> {
        let (jobs, job_queue) = async_channel::unbounded();
        let id = {
            let mut table = self.inner.table.lock().unwrap();
            table.last_id += 1;
            let id = ConnectionId(table.last_id);
            table
                .handles
                .insert(id, ConnectionHandle::new(id, address.clone(), jobs));
            id
        };
        let discard = defer(|| {
            self.close(id);
        });

        let (connected_sender, connected) = async_channel::bounded(1);
        let worker = Worker {
            connector: self.inner.connector.clone(),
            address: address.clone(),
            service: self.inner.service,
            listener: ConnectionListener {
                id,
                registry: Arc::downgrade(&self.inner),
            },
            connected: connected_sender,
            unclaimed: connected.clone(),
            jobs: job_queue,
        };
        std::thread::Builder::new()
            .name(format!("rfcomm-{id}"))
            .spawn(move || worker.run())
            .map_err(|e| Error::native(ErrorKind::ConnectError, e))?;

        debug!("connecting {id} to {address}");
        let result = connected.recv().await;
        discard.defuse();

        let connection = match result {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                self.close(id);
                return Err(Error::native(ErrorKind::ConnectError, e));
            }
            Err(_) => {
                self.close(id);
                return Err(Error::new(
                    ErrorKind::ConnectError,
                    None,
                    "connection was closed while connecting",
                ));
            }
        };

        let opened = {
            let mut table = self.inner.table.lock().unwrap();
            match table.handles.get_mut(&id) {
                Some(handle) => {
                    handle.state = ConnectionState::Open;
                    handle.connection = Some(connection.clone());
                    true
                }
                None => false,
            }
        };

        if opened {
            info!("connected {id} to {address}");
            Ok(id)
        } else {
            // closed (or swept by a power-off) while the connect was in flight
            let _ = connection.disconnect();
            Err(Error::new(
                ErrorKind::ConnectError,
                None,
                "connection was closed while connecting",
            ))
        }
    }

    /// Writes `bytes` to the connection `id`.
    ///
    /// The write is queued on the connection's worker, so writes to one connection complete in the order they were
    /// issued while writes to different connections proceed independently.
    pub async fn write(&self, id: ConnectionId, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let (reply, response) = async_channel::bounded(1);
        {
            let table = self.inner.table.lock().unwrap();
            let handle = table.handles.get(&id).ok_or_else(unknown_connection)?;
            handle
                .jobs
                .try_send(WriteJob {
                    bytes: bytes.into(),
                    reply,
                })
                .map_err(|_| Error::new(ErrorKind::WriteError, None, "connection is closed"))?;
        }

        match response.recv().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::native(ErrorKind::WriteError, e)),
            Err(_) => Err(Error::new(
                ErrorKind::WriteError,
                None,
                "connection closed before the write completed",
            )),
        }
    }

    /// Closes the connection `id`. Returns `false` if there was no such connection, which is not an error.
    pub fn close(&self, id: ConnectionId) -> bool {
        let handle = self.inner.table.lock().unwrap().handles.remove(&id);
        match handle {
            Some(handle) => {
                handle.shutdown();
                true
            }
            None => false,
        }
    }

    /// Subscribes to the bytes received on connection `id`.
    ///
    /// Only bytes that arrive after subscribing are delivered. The stream ends when the connection closes; dropping
    /// the stream closes the connection. Subscribing again replaces the previous subscriber, whose stream then ends
    /// without closing the connection.
    pub fn subscribe(&self, id: ConnectionId) -> Result<EventStream<Vec<u8>>> {
        let table = self.inner.table.lock().unwrap();
        let handle = table.handles.get(&id).ok_or_else(unknown_connection)?;
        let registry = Arc::downgrade(&self.inner);
        Ok(handle.reader.subscribe(move || {
            if let Some(inner) = registry.upgrade() {
                debug!("read stream for {id} cancelled");
                ConnectionRegistry { inner }.close(id);
            }
        }))
    }

    /// Forwards bytes received on connection `id` to its subscriber. Returns `false` if they were dropped.
    pub fn on_remote_bytes(&self, id: ConnectionId, buffer: &[u8]) -> bool {
        let table = self.inner.table.lock().unwrap();
        table
            .handles
            .get(&id)
            .is_some_and(|handle| handle.reader.publish(buffer.to_vec()))
    }

    /// Handles a hangup by the peer of connection `id`.
    pub fn on_remote_disconnect(&self, id: ConnectionId) -> bool {
        let closed = self.close(id);
        if closed {
            info!("connection {id} closed by remote");
        }
        closed
    }

    /// Closes every connection and returns them in their final (closed) state.
    ///
    /// Returns only after each connection has been closed.
    pub fn teardown_all(&self) -> Vec<ConnectionInfo> {
        let handles: Vec<ConnectionHandle> = {
            let mut table = self.inner.table.lock().unwrap();
            table.handles.drain().map(|(_, handle)| handle).collect()
        };
        let mut closed: Vec<ConnectionInfo> = handles.into_iter().map(ConnectionHandle::shutdown).collect();
        closed.sort_by_key(|info| info.id);
        if !closed.is_empty() {
            info!("closed {} connection(s) in registry teardown", closed.len());
        }
        closed
    }

    /// The state of connection `id`, or `None` if it is not in the registry.
    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.inner.table.lock().unwrap().handles.get(&id).map(|h| h.state)
    }

    /// Snapshots of all connections in the registry, ordered by identifier.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .inner
            .table
            .lock()
            .unwrap()
            .handles
            .values()
            .map(ConnectionHandle::info)
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// The number of connections in the registry
    pub fn len(&self) -> usize {
        self.inner.table.lock().unwrap().handles.len()
    }

    /// Whether the registry holds no connections
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The platform's channel back into the bridge for one connection.
///
/// Handed to [`SerialConnector::connect`]; the platform calls it from its own callback context.
#[derive(Clone)]
pub struct ConnectionListener {
    id: ConnectionId,
    registry: Weak<RegistryInner>,
}

impl ConnectionListener {
    /// The identifier of the connection this listener reports for
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Reports bytes received from the peer.
    pub fn bytes_received(&self, buffer: &[u8]) {
        if let Some(inner) = self.registry.upgrade() {
            ConnectionRegistry { inner }.on_remote_bytes(self.id, buffer);
        }
    }

    /// Reports that the connection went down. Local disconnects are already accounted for by the registry.
    pub fn disconnected(&self, by_remote: bool) {
        if !by_remote {
            debug!("connection {} disconnected locally", self.id);
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            ConnectionRegistry { inner }.on_remote_disconnect(self.id);
        }
    }
}

impl std::fmt::Debug for ConnectionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionListener").field("id", &self.id).finish()
    }
}
