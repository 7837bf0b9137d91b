//! Transport layer for the DNS server.
//!
//! Provides the stream (TCP) and datagram (UDP) transports that accept
//! queries from clients and write replies back through per-connection and
//! per-socket send queues.

pub mod tcp;
pub mod udp;

/// Largest wire message either transport will accept.
pub const MAX_MESSAGE_SIZE: usize = 65535;
