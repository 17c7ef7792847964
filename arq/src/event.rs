//! Fault and lifecycle notifications
//!
//! Every transport owns a bounded event channel. Events are offered with
//! `try_send`; when the consumer falls behind and the channel is full the
//! event is counted and dropped, so protocol threads never block on it.

use arq_protocol::{FramingError, SeqNumber};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Something the transport observed and survived, or its failure
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The first datagram fixed the peer address
    PeerBound { peer: SocketAddr },
    /// A datagram arrived from an address other than the bound peer
    PeerMismatch {
        expected: SocketAddr,
        actual: SocketAddr,
    },
    /// A sequence number at or beyond `base + size`
    OutOfWindow {
        seq: SeqNumber,
        base: SeqNumber,
        size: u64,
    },
    /// An acknowledgment for a sequence already acknowledged
    DuplicateAck { seq: SeqNumber },
    /// An acknowledgment inside the window for a sequence never sent
    UnsentAck { seq: SeqNumber },
    /// A segment already buffered or already delivered
    DuplicateSegment { seq: SeqNumber },
    /// A datagram that does not decode as a segment
    Framing {
        from: SocketAddr,
        error: FramingError,
    },
    /// A segment was queued again after its timer expired
    Retransmit { seq: SeqNumber, timeout: Duration },
    /// The transport stopped on an unrecoverable error
    Failed { reason: String },
}

/// Producer side of the event channel
#[derive(Debug)]
pub(crate) struct EventEmitter {
    tx: Sender<TransportEvent>,
    rx: Receiver<TransportEvent>,
    dropped: AtomicU64,
}

impl EventEmitter {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        EventEmitter {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer an event without blocking
    pub(crate) fn emit(&self, event: TransportEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(?event, "Event channel full, dropping");
            }
            // we hold a receiver, so the channel cannot disconnect
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// A receiver for the event stream
    ///
    /// All receivers share one queue; each event goes to one of them.
    pub(crate) fn subscribe(&self) -> Receiver<TransportEvent> {
        self.rx.clone()
    }

    /// Events discarded because the channel was full
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_receive() {
        let emitter = EventEmitter::new(4);
        let events = emitter.subscribe();

        emitter.emit(TransportEvent::DuplicateAck {
            seq: SeqNumber::new(3),
        });
        assert_eq!(
            events.try_recv().unwrap(),
            TransportEvent::DuplicateAck {
                seq: SeqNumber::new(3)
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_drops() {
        let emitter = EventEmitter::new(2);
        for seq in 0..5 {
            emitter.emit(TransportEvent::DuplicateSegment {
                seq: SeqNumber::new(seq),
            });
        }

        assert_eq!(emitter.dropped(), 3);
        let events = emitter.subscribe();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events.recv().unwrap(),
            TransportEvent::DuplicateSegment {
                seq: SeqNumber::new(0)
            }
        );
    }
}
