//! Stream transport: length-framed DNS queries over TCP.
//!
//! Each accepted connection runs as its own task: read a 4-byte big-endian
//! length prefix, read exactly that many body bytes, decode, resolve,
//! encode, and queue the framed reply. Any transport or decode failure
//! terminates the connection; the peer never gets an error reply.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::message::Message;
use crate::resolver::Resolver;
use crate::sendq::SendQueue;
use crate::server::ConnectionTracker;

use super::MAX_MESSAGE_SIZE;

/// Bytes in the big-endian frame length prefix.
const FRAME_HEADER_LEN: usize = 4;

/// Stream transport for the DNS server.
///
/// Binds a listener and accepts connections from clients. Each connection
/// is handled in a separate local task.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind the stream listener.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the accept loop.
    ///
    /// Every accepted connection is registered with `connections` for the
    /// lifetime of its task, so shutdown can abort it.
    pub fn start(
        self,
        resolver: Rc<Resolver>,
        connections: ConnectionTracker,
    ) -> tokio::task::JoinHandle<()> {
        tokio::task::spawn_local(run_accept_loop(self.listener, resolver, connections))
    }
}

/// Accept loop. Accept errors affect no existing connection; log and go on.
async fn run_accept_loop(
    listener: TcpListener,
    resolver: Rc<Resolver>,
    connections: ConnectionTracker,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                spawn_connection(stream, peer, resolver.clone(), connections.clone());
            }
            Err(e) => {
                debug!(error = %e, "TCP accept error");
            }
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    resolver: Rc<Resolver>,
    connections: ConnectionTracker,
) {
    let conn_id = connections.allocate_id();
    let tracker = connections.clone();

    let handle = tokio::task::spawn_local(async move {
        debug!(conn = conn_id, peer = %peer, "connection accepted");
        let reason = handle_connection(stream, resolver).await;
        debug!(conn = conn_id, peer = %peer, reason, "connection terminated");
        tracker.remove(conn_id);
    });

    connections.insert(conn_id, handle);
}

/// Drive one connection until it terminates; returns the reason.
///
/// The send queue is dropped on return, which cancels any write still in
/// flight and releases the connection's buffers.
async fn handle_connection(stream: TcpStream, resolver: Rc<Resolver>) -> &'static str {
    let (mut read_half, write_half) = stream.into_split();
    let queue = SendQueue::new(write_half);

    loop {
        let body = match read_frame(&mut read_half).await {
            Ok(Some(body)) => body,
            Ok(None) => return "peer closed",
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return "invalid frame length",
            Err(_) => return "read error",
        };

        // A query we cannot decode poisons the whole stream; drop the
        // connection without responding.
        let query = match Message::decode(&body) {
            Ok(query) => query,
            Err(_) => return "decode failed",
        };

        let reply = resolver.respond(&query).encode();

        let mut framed = Vec::with_capacity(FRAME_HEADER_LEN + reply.len());
        framed.extend_from_slice(&(reply.len() as u32).to_be_bytes());
        framed.extend_from_slice(&reply);

        if queue.enqueue(framed).is_err() {
            return "write error";
        }
    }
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` when the peer closes before a new frame starts. The
/// body is not handed back (and never decoded) until all of it has
/// arrived.
async fn read_frame(stream: &mut OwnedReadHalf) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(header) as usize;
    // A conforming peer never sends a zero length, and the wire format
    // cannot express a message past 64KiB.
    if len == 0 || len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame length out of range",
        ));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;

    Ok(Some(body))
}
