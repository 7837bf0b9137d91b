//! Signpost - a lightweight DNS answering server.
//!
//! Accepts name queries over length-framed TCP and plain UDP, answers
//! them through a pluggable resolution policy, and never blocks its
//! single-threaded scheduler.

pub mod message;
pub mod resolver;
pub mod sendq;
pub mod server;
pub mod transport;
