//! Segment Structure and Serialization
//!
//! A segment is the unit the ARQ engine sends in one datagram: a 10-byte
//! ASCII sequence field followed by a fixed-size payload. Every encoded
//! segment has the same size, so a receiver reads exactly one segment per
//! datagram without a length prefix.
//!
//! ```text
//!  0          10                                           522
//!  +----------+---------------------------------------------+
//!  | sequence |                 payload                     |
//!  +----------+---------------------------------------------+
//! ```
//!
//! Acknowledgments are segments with a blank payload.

use crate::framing::{ensure_len, parse_decimal, put_decimal, FramingError, PAD_BYTE};
use crate::sequence::{SeqNumber, SEQ_FIELD_WIDTH};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the segment header (the sequence field)
pub const HEADER_SIZE: usize = SEQ_FIELD_WIDTH;

/// Size of the segment payload
pub const SEGMENT_SIZE: usize = 512;

/// Size of an encoded segment (header + payload)
pub const TOTAL_SIZE: usize = HEADER_SIZE + SEGMENT_SIZE;

static BLANK_PAYLOAD: [u8; SEGMENT_SIZE] = [PAD_BYTE; SEGMENT_SIZE];

/// One ARQ transmission unit
///
/// The payload is always exactly `SEGMENT_SIZE` bytes. Shorter payloads are
/// blank-padded at construction, so a decoded segment compares equal to the
/// one that was encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    seq: SeqNumber,
    payload: Bytes,
}

impl Segment {
    /// Create a new segment, padding the payload to `SEGMENT_SIZE`
    pub fn new(seq: SeqNumber, payload: Bytes) -> Result<Self, FramingError> {
        if payload.len() > SEGMENT_SIZE {
            return Err(FramingError::PayloadTooLarge {
                size: payload.len(),
                max: SEGMENT_SIZE,
            });
        }

        let payload = if payload.len() == SEGMENT_SIZE {
            payload
        } else {
            let mut padded = BytesMut::with_capacity(SEGMENT_SIZE);
            padded.put_slice(&payload);
            padded.put_bytes(PAD_BYTE, SEGMENT_SIZE - payload.len());
            padded.freeze()
        };

        Ok(Segment { seq, payload })
    }

    /// Create an acknowledgment for `seq`
    pub fn ack(seq: SeqNumber) -> Self {
        Segment {
            seq,
            payload: Bytes::from_static(&BLANK_PAYLOAD),
        }
    }

    /// Get the sequence number
    #[inline]
    pub fn seq(&self) -> SeqNumber {
        self.seq
    }

    /// Get the padded payload
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the segment, returning its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Serialize the segment to its fixed-width wire form
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(TOTAL_SIZE);
        // the sequence field is 10 digits wide and SeqNumber never exceeds it
        if put_decimal(&mut buf, "sequence", self.seq.as_raw(), HEADER_SIZE).is_err() {
            unreachable!("sequence {} exceeds the header width", self.seq);
        }
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse a segment from its wire form
    ///
    /// The payload is taken by width only; trailing blanks are kept.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FramingError> {
        ensure_len(bytes, TOTAL_SIZE)?;

        let raw_seq = parse_decimal(&bytes[..HEADER_SIZE], "sequence")?;
        let seq = SeqNumber::checked(raw_seq).ok_or(FramingError::FieldOverflow {
            field: "sequence",
            value: raw_seq,
            width: HEADER_SIZE,
        })?;

        Ok(Segment {
            seq,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..TOTAL_SIZE]),
        })
    }
}
