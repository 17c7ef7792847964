//! Single-peer binding
//!
//! A transport talks to exactly one remote address. The address is either
//! known up front (the sender's destination) or learned from the first
//! datagram that arrives; once set it never changes.

use std::net::SocketAddr;
use std::sync::OnceLock;

/// Result of checking a datagram source against the binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCheck {
    /// This datagram fixed the peer
    Bound,
    /// The datagram came from the bound peer
    Matched,
    /// The datagram came from somewhere else
    Mismatch { expected: SocketAddr },
}

/// The one remote address a transport accepts datagrams from
#[derive(Debug, Default)]
pub struct PeerBinding {
    peer: OnceLock<SocketAddr>,
}

impl PeerBinding {
    /// A binding that adopts the first source it sees
    pub fn unbound() -> Self {
        PeerBinding {
            peer: OnceLock::new(),
        }
    }

    /// A binding fixed to `peer`
    pub fn bound(peer: SocketAddr) -> Self {
        let binding = Self::unbound();
        let _ = binding.peer.set(peer);
        binding
    }

    /// The bound peer, if any
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.get().copied()
    }

    /// Check `from` against the binding, binding it if still unset
    pub fn admit(&self, from: SocketAddr) -> PeerCheck {
        if let Some(&peer) = self.peer.get() {
            return Self::compare(peer, from);
        }
        match self.peer.set(from) {
            Ok(()) => PeerCheck::Bound,
            // lost a race with another caller; compare against the winner
            Err(_) => match self.peer.get() {
                Some(&peer) => Self::compare(peer, from),
                None => PeerCheck::Matched,
            },
        }
    }

    fn compare(peer: SocketAddr, from: SocketAddr) -> PeerCheck {
        if peer == from {
            PeerCheck::Matched
        } else {
            PeerCheck::Mismatch { expected: peer }
        }
    }
}
