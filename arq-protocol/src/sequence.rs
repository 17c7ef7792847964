//! Sequence Number Handling
//!
//! Sequence numbers travel as a 10-digit ASCII decimal field, so the space is
//! `0..=9_999_999_999`. Sequence numbers are assigned once per segment and never
//! wrap; exhausting the space ends the session.

use std::fmt;

/// Width of the sequence field on the wire, in ASCII digits
pub const SEQ_FIELD_WIDTH: usize = 10;

/// Largest sequence number representable in the wire field
pub const MAX_SEQ_NUMBER: u64 = 9_999_999_999;

/// Sequence number of a segment, monotonically assigned by the sender
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct SeqNumber(u64);

impl SeqNumber {
    /// The first sequence number of every session
    pub const ZERO: SeqNumber = SeqNumber(0);

    /// Create a new sequence number
    ///
    /// # Panics
    /// Panics if value exceeds MAX_SEQ_NUMBER
    pub fn new(value: u64) -> Self {
        assert!(
            value <= MAX_SEQ_NUMBER,
            "Sequence number {} exceeds maximum {}",
            value,
            MAX_SEQ_NUMBER
        );
        SeqNumber(value)
    }

    /// Create a sequence number, returning `None` if it does not fit the wire field
    pub fn checked(value: u64) -> Option<Self> {
        (value <= MAX_SEQ_NUMBER).then_some(SeqNumber(value))
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Get the next sequence number, or `None` once the space is exhausted
    #[inline]
    pub fn next(self) -> Option<Self> {
        SeqNumber::checked(self.0 + 1)
    }

    /// Check whether this sequence number lies in `[base, base + size)`
    #[inline]
    pub fn in_window(self, base: SeqNumber, size: u64) -> bool {
        self.0 >= base.0 && self.0 - base.0 < size
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SeqNumber> for u64 {
    fn from(seq: SeqNumber) -> u64 {
        seq.0
    }
}
