//! Fixed-width ASCII field framing
//!
//! Every header field on the wire is a left-aligned, blank-padded ASCII value
//! of a fixed width. Integers are decimal. Both the segment and the fragment
//! codecs are built from the helpers here.

use bytes::{BufMut, BytesMut};
use std::io::Write;
use thiserror::Error;

/// Byte used to pad fields and payloads
pub const PAD_BYTE: u8 = b' ';

/// Malformed or truncated wire data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Malformed {field} field: {raw:?}")]
    MalformedInteger { field: &'static str, raw: String },

    #[error("Value {value} does not fit the {width}-byte {field} field")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        width: usize,
    },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Fragment index {index} is past the last index {last_index}")]
    IndexOutOfRange { index: u32, last_index: u32 },
}

/// Write `value` as left-aligned decimal, padded with blanks to `width`
pub(crate) fn put_decimal(
    buf: &mut BytesMut,
    field: &'static str,
    value: u64,
    width: usize,
) -> Result<(), FramingError> {
    let mut digits = [0u8; 20];
    let mut cursor = &mut digits[..];
    // a u64 never needs more than 20 digits
    let _ = write!(cursor, "{}", value);
    let len = 20 - cursor.len();
    if len > width {
        return Err(FramingError::FieldOverflow { field, value, width });
    }
    buf.put_slice(&digits[..len]);
    buf.put_bytes(PAD_BYTE, width - len);
    Ok(())
}

/// Write `raw` truncated or blank-padded to exactly `width` bytes
pub(crate) fn put_padded(buf: &mut BytesMut, raw: &[u8], width: usize) {
    let len = raw.len().min(width);
    buf.put_slice(&raw[..len]);
    buf.put_bytes(PAD_BYTE, width - len);
}

/// Parse a blank-padded decimal field
pub(crate) fn parse_decimal(raw: &[u8], field: &'static str) -> Result<u64, FramingError> {
    let trimmed = trim_blanks(raw);
    let malformed = || FramingError::MalformedInteger {
        field,
        raw: String::from_utf8_lossy(raw).into_owned(),
    };

    if trimmed.is_empty() || !trimmed.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }

    trimmed.iter().try_fold(0u64, |acc, digit| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u64::from(digit - b'0')))
            .ok_or_else(malformed)
    })
}

/// Strip leading and trailing ASCII whitespace
pub(crate) fn trim_blanks(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &raw[start..end]
}

/// Fail with `InsufficientData` unless `raw` holds at least `expected` bytes
pub(crate) fn ensure_len(raw: &[u8], expected: usize) -> Result<(), FramingError> {
    if raw.len() < expected {
        return Err(FramingError::InsufficientData {
            expected,
            actual: raw.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_decimal_pads_right() {
        let mut buf = BytesMut::new();
        put_decimal(&mut buf, "seq", 42, 5).unwrap();
        assert_eq!(&buf[..], b"42   ");
    }

    #[test]
    fn test_put_decimal_overflow() {
        let mut buf = BytesMut::new();
        let err = put_decimal(&mut buf, "index", 100_000, 5).unwrap_err();
        assert!(matches!(err, FramingError::FieldOverflow { width: 5, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_put_padded_truncates() {
        let mut buf = BytesMut::new();
        put_padded(&mut buf, b"abcdef", 4);
        put_padded(&mut buf, b"xy", 4);
        assert_eq!(&buf[..], b"abcdxy  ");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(b"1234      ", "seq").unwrap(), 1234);
        assert_eq!(parse_decimal(b"  7  ", "seq").unwrap(), 7);
        assert_eq!(parse_decimal(b"0", "seq").unwrap(), 0);
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        let cases: [&[u8]; 5] = [b"     ", b"-1   ", b"1 2  ", b"12a  ", b"+5   "];
        for raw in cases {
            assert!(parse_decimal(raw, "seq").is_err(), "{:?}", raw);
        }
    }

    #[test]
    fn test_parse_decimal_overflow() {
        assert!(parse_decimal(b"99999999999999999999999", "seq").is_err());
    }

    #[test]
    fn test_trim_blanks() {
        assert_eq!(trim_blanks(b"  ab c  "), b"ab c");
        assert_eq!(trim_blanks(b"    "), b"");
        assert_eq!(trim_blanks(b""), b"");
    }
}
