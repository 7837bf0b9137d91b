//! Server composition: socket setup and lifetime management.
//!
//! Binds one TCP listener and one UDP socket per configured address,
//! hands them to the transport loops, and keeps a weak table of live
//! stream connections so shutdown can abort them.

use std::cell::RefCell;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::resolver::Resolver;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};

/// Standard name-service port.
pub const DEFAULT_PORT: u16 = 53;

/// Listening configuration for the server.
pub struct ServerConfig {
    /// Addresses to listen on; each gets one TCP and one UDP socket.
    pub addresses: Vec<IpAddr>,
    /// Port shared by every binding.
    pub port: u16,
}

/// Fatal socket-setup failure, reported to the caller.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind TCP {addr}: {source}")]
    BindTcp { addr: SocketAddr, source: io::Error },
    #[error("failed to bind UDP {addr}: {source}")]
    BindUdp { addr: SocketAddr, source: io::Error },
}

/// Table of live stream-connection tasks, keyed by connection id.
///
/// Tracks connections only so shutdown can abort them; each connection
/// removes itself when it terminates. Everything runs on one thread, so a
/// `RefCell` is all the synchronization needed.
#[derive(Clone, Default)]
pub struct ConnectionTracker {
    inner: Rc<RefCell<TrackerInner>>,
}

#[derive(Default)]
struct TrackerInner {
    next_id: u64,
    live: FxHashMap<u64, JoinHandle<()>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a connection about to be spawned.
    pub fn allocate_id(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    pub fn insert(&self, id: u64, handle: JoinHandle<()>) {
        self.inner.borrow_mut().live.insert(id, handle);
    }

    pub fn remove(&self, id: u64) {
        self.inner.borrow_mut().live.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().live.is_empty()
    }

    /// Abort every live connection task.
    pub fn shutdown(&self) {
        for (_, handle) in self.inner.borrow_mut().live.drain() {
            handle.abort();
        }
    }
}

/// Bind all configured sockets and run until interrupted.
///
/// Any bind failure is fatal for setup and reported to the caller;
/// sockets bound before the failure are released on return. Must run
/// inside a `LocalSet`.
pub async fn run(config: ServerConfig, resolver: Resolver) -> Result<(), ServerError> {
    let resolver = Rc::new(resolver);
    let connections = ConnectionTracker::new();
    let mut listeners = Vec::new();

    for address in &config.addresses {
        let addr = SocketAddr::new(*address, config.port);

        let tcp = TcpTransport::bind(addr)
            .await
            .map_err(|source| ServerError::BindTcp { addr, source })?;
        let udp = UdpTransport::bind(addr)
            .await
            .map_err(|source| ServerError::BindUdp { addr, source })?;

        info!(%addr, "listening on TCP and UDP");

        listeners.push(tcp.start(resolver.clone(), connections.clone()));
        listeners.push(udp.start(resolver.clone()));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(connections = connections.len(), "interrupt received, shutting down");
        }
        _ = futures::future::join_all(listeners) => {
            warn!("all listeners stopped");
        }
    }

    connections.shutdown();

    Ok(())
}
