//! Reconnecting subscriber for the relay.
//!
//! [`ReconnectionManager`] keeps one logical connection alive across
//! transport failures, retrying on a capped exponential [`Backoff`], and
//! mirrors every pushed event into a [`LocalStore`] through the
//! [`Reconciler`].

pub mod backoff;
pub mod credentials;
pub mod manager;
pub mod reconciler;
pub mod state;

pub use backoff::Backoff;
pub use credentials::{Credential, CredentialProvider, StaticCredentials, TokenFile};
pub use manager::{ClientHandle, ReconnectionManager};
pub use reconciler::{ApplyOutcome, LocalStore, MemoryStore, Reconciler};
pub use state::{ClientConnectionState, ClientEvent, ClientPhase};
