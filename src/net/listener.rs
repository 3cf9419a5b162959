//! Bounded TCP listeners.
//!
//! The client port and the admin port both accept through [`Listener`]. Each
//! accepted connection holds a [`ConnectionSlot`]; once every slot is taken,
//! `accept` stops pulling connections off the socket until one is released.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Which service a listener belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    Client,
    Admin,
}

impl Port {
    pub fn as_str(self) -> &'static str {
        match self {
            Port::Client => "client",
            Port::Admin => "admin",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("'{0}' is not a socket address")]
    Address(String),

    #[error("cannot bind: {0}")]
    Bind(#[source] std::io::Error),

    /// Transient; the accept loop logs it and carries on.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("listener closed")]
    Closed,
}

/// A connection taken off the socket.
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    /// Hold until the connection is done.
    pub slot: ConnectionSlot,
}

/// One unit of a listener's capacity. Released on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    _permit: OwnedSemaphorePermit,
}

pub struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
    slots: Arc<Semaphore>,
    capacity: usize,
    port: Port,
}

impl Listener {
    pub async fn bind(port: Port, bind_address: &str, capacity: usize) -> Result<Self, ListenerError> {
        let addr: SocketAddr = bind_address
            .parse()
            .map_err(|_| ListenerError::Address(bind_address.to_owned()))?;
        let socket = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = socket.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(port = %port, address = %local_addr, capacity, "Listening");
        Ok(Self {
            socket,
            local_addr,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            port,
        })
    }

    /// Wait for a free slot, then for a connection.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        if self.slots.available_permits() == 0 {
            tracing::debug!(port = %self.port, capacity = self.capacity, "At capacity, waiting for a slot");
        }
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, error = %e, "Could not set TCP_NODELAY");
        }
        metrics::record_connection_accepted(self.port.as_str());

        Ok(Accepted {
            stream,
            peer,
            slot: ConnectionSlot { _permit: permit },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("port", &self.port)
            .field("local_addr", &self.local_addr)
            .field("capacity", &self.capacity)
            .finish()
    }
}
