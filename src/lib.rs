//! # article-relay
//!
//! Real-time change notifications for a shared article catalogue.
//!
//! The server side admits authenticated WebSocket subscribers, fans out
//! every create/update/delete to all of them, and evicts subscribers that
//! stop answering liveness probes. The client side keeps a subscription
//! alive across network failures and applies the pushed changes to a local
//! cache idempotently.
//!
//! ## Architecture
//!
//! ```text
//! Event source (POST /api/v1/events, ChangeFeed)
//!     │
//!     ├── ChangeFeed pump (service/)
//!     ├── Dispatcher (service/) ── serialize once, push to every queue
//!     │
//!     ├── ConnectionRegistry (domain/) ◄── LivenessMonitor (service/)
//!     ├── per-connection OutboundQueue (domain/)
//!     │
//!     └── WS handler + read/write loops (ws/)
//!             │
//!             ▼
//!     ReconnectionManager (client/) ── Backoff, CredentialProvider
//!             │
//!             └── Reconciler ── LocalStore
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
