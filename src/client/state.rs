//! Client connection state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --handshake ok--> Connected
//!      |                        |                           |
//!      |                 handshake failed            transport closed
//!      |                        v                           |
//!      +--no credential--> Backoff <------------------------+
//!                           |   ^
//!                           +---+ no credential
//!                           |
//!                           +--connect--> Connecting
//!
//! any --logout--> Disconnected
//! ```

use std::time::Duration;

use super::Backoff;

/// Phase of the client's logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientPhase {
    /// Initial state, and terminal after logout.
    Disconnected,
    /// Upgrade request or admission acknowledgement in flight.
    Connecting,
    /// Admitted and receiving events.
    Connected,
    /// Waiting before the next attempt.
    Backoff,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// A credential is available and an attempt starts.
    Connect,
    /// The server admitted the connection.
    HandshakeSucceeded,
    /// The attempt failed, timed out, or was refused.
    HandshakeFailed,
    /// An established transport closed or errored.
    TransportClosed,
    /// No usable credential could be obtained.
    CredentialUnavailable,
    /// Explicit logout or disconnect.
    Logout,
}

/// Local view of one logical connection across reconnect cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConnectionState {
    /// Current phase.
    pub phase: ClientPhase,
    /// Consecutive failed attempts; reset on admission.
    pub attempt: u32,
}

impl ClientConnectionState {
    /// Fresh `Disconnected` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: ClientPhase::Disconnected,
            attempt: 0,
        }
    }

    /// Returns the state after `event`, or `None` if the event is not
    /// valid in the current phase.
    #[must_use]
    pub const fn transition(self, event: ClientEvent) -> Option<Self> {
        use ClientEvent as E;
        use ClientPhase as P;

        let next = match (self.phase, event) {
            (_, E::Logout) => Self::new(),
            (P::Disconnected | P::Backoff, E::Connect) => Self {
                phase: P::Connecting,
                attempt: self.attempt,
            },
            (P::Connecting, E::HandshakeSucceeded) => Self {
                phase: P::Connected,
                attempt: 0,
            },
            (P::Connecting, E::HandshakeFailed)
            | (P::Connected, E::TransportClosed)
            | (P::Disconnected | P::Backoff, E::CredentialUnavailable) => Self {
                phase: P::Backoff,
                attempt: self.attempt.saturating_add(1),
            },
            _ => return None,
        };
        Some(next)
    }

    /// Delay to wait in `Backoff` before the next attempt.
    ///
    /// After the `k`-th consecutive failure (`attempt == k`) this is
    /// `backoff.next_delay(k - 1)`, so the first retry waits the base delay.
    #[must_use]
    pub fn next_delay(&self, backoff: &Backoff) -> Duration {
        backoff.next_delay(self.attempt.saturating_sub(1))
    }
}

impl Default for ClientConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn step(state: ClientConnectionState, event: ClientEvent) -> ClientConnectionState {
        let Some(next) = state.transition(event) else {
            panic!("{event:?} invalid in {:?}", state.phase);
        };
        next
    }

    #[test]
    fn happy_path_resets_attempt() {
        let s = step(ClientConnectionState::new(), ClientEvent::Connect);
        let s = step(s, ClientEvent::HandshakeFailed);
        assert_eq!((s.phase, s.attempt), (ClientPhase::Backoff, 1));
        let s = step(s, ClientEvent::Connect);
        assert_eq!((s.phase, s.attempt), (ClientPhase::Connecting, 1));
        let s = step(s, ClientEvent::HandshakeSucceeded);
        assert_eq!((s.phase, s.attempt), (ClientPhase::Connected, 0));
    }

    #[test]
    fn drop_enters_backoff_and_waits_base_delay() {
        let backoff = Backoff::default();
        let s = step(ClientConnectionState::new(), ClientEvent::Connect);
        let s = step(s, ClientEvent::HandshakeSucceeded);
        let s = step(s, ClientEvent::TransportClosed);
        assert_eq!((s.phase, s.attempt), (ClientPhase::Backoff, 1));
        assert_eq!(s.next_delay(&backoff), backoff.next_delay(0));
    }

    #[test]
    fn failed_reacquisition_stays_in_backoff() {
        let s = step(ClientConnectionState::new(), ClientEvent::CredentialUnavailable);
        let s = step(s, ClientEvent::CredentialUnavailable);
        assert_eq!((s.phase, s.attempt), (ClientPhase::Backoff, 2));
    }

    #[test]
    fn logout_from_any_phase() {
        for phase in [
            ClientPhase::Disconnected,
            ClientPhase::Connecting,
            ClientPhase::Connected,
            ClientPhase::Backoff,
        ] {
            let s = ClientConnectionState { phase, attempt: 3 };
            assert_eq!(step(s, ClientEvent::Logout), ClientConnectionState::new());
        }
    }

    #[test]
    fn rejects_out_of_phase_events() {
        let s = ClientConnectionState::new();
        assert_eq!(s.transition(ClientEvent::HandshakeSucceeded), None);
        assert_eq!(s.transition(ClientEvent::TransportClosed), None);

        let connected = ClientConnectionState {
            phase: ClientPhase::Connected,
            attempt: 0,
        };
        assert_eq!(connected.transition(ClientEvent::Connect), None);
    }
}
