//! Ordered outbound write queues.
//!
//! Every stream connection and every datagram socket owns one queue.
//! Buffers go out whole and in enqueue order; enqueueing while a write is
//! in flight waits its turn instead of interleaving bytes. Draining runs
//! in a dedicated local task, so enqueue never blocks the scheduler.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The queue's drain task has stopped; the buffer was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("send queue closed")]
pub struct QueueClosed;

/// FIFO of outbound buffers for one stream connection.
///
/// The queue owns each buffer until its write fully completes. Dropping
/// the queue cancels the drain task, abandoning any write in flight.
pub struct SendQueue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl SendQueue {
    /// Spawn the drain task over a connection's write half.
    ///
    /// Must be called from within a `LocalSet`.
    pub fn new<W>(mut writer: W) -> Self
    where
        W: AsyncWrite + Unpin + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let task = tokio::task::spawn_local(async move {
            while let Some(buf) = rx.recv().await {
                if writer.write_all(&buf).await.is_err() {
                    // Dropping the receiver makes later enqueues fail,
                    // which is how the connection learns the peer is gone.
                    return;
                }
            }
        });

        Self { tx, task }
    }

    /// Queue one buffer to be written after everything queued before it.
    pub fn enqueue(&self, buf: Vec<u8>) -> Result<(), QueueClosed> {
        self.tx.send(buf).map_err(|_| QueueClosed)
    }
}

impl Drop for SendQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// FIFO of outbound datagrams for one socket.
///
/// Unlike the stream queue, a failed send drops that one response and
/// draining continues; a datagram socket has no connection to tear down.
pub struct DatagramQueue {
    tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    task: JoinHandle<()>,
}

impl DatagramQueue {
    /// Spawn the drain task over a bound datagram socket.
    ///
    /// Must be called from within a `LocalSet`.
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Vec<u8>, SocketAddr)>();

        let task = tokio::task::spawn_local(async move {
            while let Some((buf, peer)) = rx.recv().await {
                let _ = socket.send_to(&buf, peer).await;
            }
        });

        Self { tx, task }
    }

    /// Queue one datagram for the given peer.
    pub fn enqueue(&self, buf: Vec<u8>, peer: SocketAddr) -> Result<(), QueueClosed> {
        self.tx.send((buf, peer)).map_err(|_| QueueClosed)
    }
}

impl Drop for DatagramQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}
