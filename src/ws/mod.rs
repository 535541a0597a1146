//! WebSocket layer: upgrade handling, per-connection loops, wire messages.
//!
//! The WebSocket endpoint at `/ws` pushes article change notifications to
//! every authenticated client.

pub mod connection;
pub mod handler;
pub mod messages;
