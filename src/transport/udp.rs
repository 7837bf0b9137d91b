//! Datagram transport: one DNS query per UDP payload.
//!
//! A single task owns the socket's receive side. Each datagram is decoded,
//! resolved, and its reply queued on the socket's send queue; the receive
//! re-arms immediately instead of waiting for the send. Malformed
//! datagrams are dropped silently; nothing a peer sends can stop the
//! socket.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::trace;

use crate::message::Message;
use crate::resolver::Resolver;
use crate::sendq::DatagramQueue;

use super::MAX_MESSAGE_SIZE;

/// Datagram transport for the DNS server.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the datagram socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop.
    pub fn start(self, resolver: Rc<Resolver>) -> tokio::task::JoinHandle<()> {
        let queue = DatagramQueue::new(self.socket.clone());
        tokio::task::spawn_local(run(self.socket, queue, resolver))
    }
}

/// Receive loop. Every iteration is one independent call; no state
/// survives from one datagram to the next.
async fn run(socket: Arc<UdpSocket>, queue: DatagramQueue, resolver: Rc<Resolver>) {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                // Drop this cycle only; the socket keeps listening.
                trace!(error = %e, "UDP recv error");
                continue;
            }
        };

        match handle_datagram(&buf[..len], &resolver) {
            Some(reply) => {
                // The queue owns the reply from here; a failed send is
                // dropped there without our involvement.
                if queue.enqueue(reply, peer).is_err() {
                    return;
                }
            }
            None => {
                trace!(peer = %peer, len, "dropping undecodable datagram");
            }
        }
    }
}

/// Decode, resolve, and encode one datagram payload.
///
/// `None` means the payload was not a wire message; the caller drops it
/// without responding.
fn handle_datagram(payload: &[u8], resolver: &Resolver) -> Option<Vec<u8>> {
    let query = Message::decode(payload).ok()?;

    Some(resolver.respond(&query).encode())
}
