//! Selective-repeat sliding windows
//!
//! [`SendWindow`] and [`ReceiveWindow`] hold all per-side window state. They
//! do no I/O and take no locks; the transport keeps each one behind a single
//! mutex and drives it through the transitions exposed here.
//!
//! ```text
//!  base                     base + size
//!   │                            │
//! ──┼────────────────────────────┼──────▶ seq space
//!   │ <──── legal sequences ───▶ │
//! ```

use crate::framing::FramingError;
use crate::segment::Segment;
use crate::sequence::SeqNumber;
use crate::timeout::TimeoutEstimator;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Send window errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Window is full")]
    Full,

    #[error("Sequence space exhausted")]
    SequenceExhausted,

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),
}

/// Result of processing one acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Acknowledgment below the window base (expected under retransmission)
    Stale { seq: SeqNumber, base: SeqNumber },
    /// Acknowledgment at or past `base + size`
    OutOfWindow {
        seq: SeqNumber,
        base: SeqNumber,
        size: u64,
    },
    /// Acknowledgment inside the window for a sequence never sent
    NotSent { seq: SeqNumber },
    /// Sequence already acknowledged
    Duplicate { seq: SeqNumber },
    /// Acknowledgment recorded
    Accepted {
        seq: SeqNumber,
        /// Time from construction to acknowledgment
        rtt: Duration,
        /// Whether the window base moved
        advanced: bool,
    },
}

/// A constructed segment awaiting acknowledgment
#[derive(Debug, Clone)]
struct InFlight {
    segment: Segment,
    constructed_at: Instant,
}

/// Send-side window state
///
/// `in_flight` and `acknowledged` only ever hold sequences in
/// `[base, base + size)`.
#[derive(Debug)]
pub struct SendWindow {
    /// Oldest unacknowledged sequence number
    base: SeqNumber,
    /// Window capacity
    size: u64,
    /// Sequence number for the next constructed segment
    next_seq: Option<SeqNumber>,
    /// Constructed, unacknowledged segments
    in_flight: BTreeMap<SeqNumber, InFlight>,
    /// Acknowledged sequences not yet below `base`
    acknowledged: BTreeSet<SeqNumber>,
    /// Retransmission timeout estimate
    estimator: TimeoutEstimator,
}

impl SendWindow {
    /// Create a new send window
    ///
    /// # Panics
    /// Panics if size is zero
    pub fn new(size: u64, estimator: TimeoutEstimator) -> Self {
        assert!(size > 0, "window size must be at least 1");
        SendWindow {
            base: SeqNumber::ZERO,
            size,
            next_seq: Some(SeqNumber::ZERO),
            in_flight: BTreeMap::new(),
            acknowledged: BTreeSet::new(),
            estimator,
        }
    }

    /// Smallest unacknowledged sequence number
    pub fn base(&self) -> SeqNumber {
        self.base
    }

    /// Window capacity
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Sequence number the next admitted payload will get
    pub fn next_seq(&self) -> Option<SeqNumber> {
        self.next_seq
    }

    /// Current retransmission timeout
    pub fn timeout(&self) -> Duration {
        self.estimator.timeout()
    }

    /// Check whether a window slot is free for a new segment
    pub fn has_free_slot(&self) -> bool {
        self.next_seq
            .is_some_and(|next| next.in_window(self.base, self.size))
    }

    /// Assign the next free slot to `payload`
    pub fn admit(&mut self, payload: Bytes, now: Instant) -> Result<Segment, WindowError> {
        let seq = self.next_seq.ok_or(WindowError::SequenceExhausted)?;
        if !seq.in_window(self.base, self.size) {
            return Err(WindowError::Full);
        }

        let segment = Segment::new(seq, payload)?;
        self.in_flight.insert(
            seq,
            InFlight {
                segment: segment.clone(),
                constructed_at: now,
            },
        );
        self.next_seq = seq.next();
        Ok(segment)
    }

    /// Get a segment that is still awaiting acknowledgment
    pub fn outstanding(&self, seq: SeqNumber) -> Option<&Segment> {
        self.in_flight.get(&seq).map(|entry| &entry.segment)
    }

    /// Number of constructed, unacknowledged segments
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Check if nothing is awaiting acknowledgment
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Process an acknowledgment for `seq` received at `now`
    pub fn on_ack(&mut self, seq: SeqNumber, now: Instant) -> AckOutcome {
        if seq < self.base {
            return AckOutcome::Stale {
                seq,
                base: self.base,
            };
        }
        if !seq.in_window(self.base, self.size) {
            return AckOutcome::OutOfWindow {
                seq,
                base: self.base,
                size: self.size,
            };
        }
        if self.acknowledged.contains(&seq) {
            return AckOutcome::Duplicate { seq };
        }
        let Some(entry) = self.in_flight.remove(&seq) else {
            return AckOutcome::NotSent { seq };
        };

        let rtt = now.saturating_duration_since(entry.constructed_at);
        self.estimator.update(rtt);
        self.acknowledged.insert(seq);

        let advanced = seq == self.base;
        if advanced {
            self.advance();
        }

        AckOutcome::Accepted { seq, rtt, advanced }
    }

    /// Move `base` past every contiguous acknowledged sequence
    fn advance(&mut self) {
        while self.acknowledged.remove(&self.base) {
            match self.base.next() {
                Some(next) => self.base = next,
                None => break,
            }
        }
    }
}

/// Why an arriving segment was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveFault {
    #[error("Segment {seq} below window base {base}")]
    BelowWindow { seq: SeqNumber, base: SeqNumber },

    #[error("Segment {seq} outside window [{base}, {base} + {size})")]
    BeyondWindow {
        seq: SeqNumber,
        base: SeqNumber,
        size: u64,
    },
}

/// Result of admitting one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// The sequence was already buffered
    pub duplicate: bool,
    /// Segments moved to the deliverable queue by this admission
    pub delivered: usize,
}

/// Receive-side window state
///
/// Every segment in `deliverable` is preceded by all smaller sequence numbers
/// of the session, either still queued ahead of it or already taken.
#[derive(Debug)]
pub struct ReceiveWindow {
    /// Next sequence number to deliver
    base: SeqNumber,
    /// Window capacity
    size: u64,
    /// Out-of-order segments waiting for a gap to close
    buffered: BTreeMap<SeqNumber, Segment>,
    /// In-order segments ready for the consumer
    deliverable: VecDeque<Segment>,
}

impl ReceiveWindow {
    /// Create a new receive window
    ///
    /// # Panics
    /// Panics if size is zero
    pub fn new(size: u64) -> Self {
        assert!(size > 0, "window size must be at least 1");
        ReceiveWindow {
            base: SeqNumber::ZERO,
            size,
            buffered: BTreeMap::new(),
            deliverable: VecDeque::new(),
        }
    }

    /// Next sequence number to deliver
    pub fn base(&self) -> SeqNumber {
        self.base
    }

    /// Window capacity
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of out-of-order segments held
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Number of segments ready for the consumer
    pub fn deliverable_len(&self) -> usize {
        self.deliverable.len()
    }

    /// Accept a segment if its sequence lies in `[base, base + size)`
    ///
    /// A refused segment leaves the window untouched.
    pub fn admit(&mut self, segment: Segment) -> Result<Admission, ReceiveFault> {
        let seq = segment.seq();
        if seq < self.base {
            return Err(ReceiveFault::BelowWindow {
                seq,
                base: self.base,
            });
        }
        if !seq.in_window(self.base, self.size) {
            return Err(ReceiveFault::BeyondWindow {
                seq,
                base: self.base,
                size: self.size,
            });
        }

        let duplicate = self.buffered.insert(seq, segment).is_some();

        let delivered = if seq == self.base { self.advance() } else { 0 };
        Ok(Admission {
            duplicate,
            delivered,
        })
    }

    /// Move every contiguous buffered segment to the deliverable queue
    fn advance(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(segment) = self.buffered.remove(&self.base) {
            self.deliverable.push_back(segment);
            delivered += 1;
            match self.base.next() {
                Some(next) => self.base = next,
                None => break,
            }
        }
        delivered
    }

    /// Take exactly `count` segments in order, if that many are ready
    pub fn take(&mut self, count: usize) -> Option<Vec<Segment>> {
        if self.deliverable.len() < count {
            return None;
        }
        Some(self.deliverable.drain(..count).collect())
    }
}
