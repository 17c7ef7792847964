//! Resource Fragmentation
//!
//! A named resource of any size is split into frames of identical size so
//! that each frame fits one segment payload. Every frame carries the resource
//! name, its own index, the last index and the unpadded resource length, so a
//! receiver can rebuild the resource from frames arriving in any order.
//!
//! ```text
//!  0        20      25      30          40                      40 + capacity
//!  +--------+-------+-------+-----------+---------------------------+
//!  |  name  | index | last  |  length   |           data            |
//!  +--------+-------+-------+-----------+---------------------------+
//! ```

use crate::framing::{
    ensure_len, parse_decimal, put_decimal, put_padded, trim_blanks, FramingError, PAD_BYTE,
};
use crate::segment::SEGMENT_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Width of the resource name field
pub const NAME_SIZE: usize = 20;

/// Width of the fragment index field
pub const INDEX_SIZE: usize = 5;

/// Width of the last-index field
pub const LAST_INDEX_SIZE: usize = 5;

/// Width of the total resource length field
pub const TOTAL_LENGTH_SIZE: usize = 10;

/// Size of the frame header
pub const FRAME_HEADER_SIZE: usize = NAME_SIZE + INDEX_SIZE + LAST_INDEX_SIZE + TOTAL_LENGTH_SIZE;

/// Data bytes per frame when one frame fills one segment payload
pub const FRAGMENT_CAPACITY: usize = SEGMENT_SIZE - FRAME_HEADER_SIZE;

const INDEX_OFFSET: usize = NAME_SIZE;
const LAST_INDEX_OFFSET: usize = INDEX_OFFSET + INDEX_SIZE;
const TOTAL_LENGTH_OFFSET: usize = LAST_INDEX_OFFSET + LAST_INDEX_SIZE;

/// One decoded frame of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Resource name, blanks trimmed
    pub name: String,
    /// Position of this fragment (0-based)
    pub index: u32,
    /// Index of the final fragment of the resource
    pub last_index: u32,
    /// Unpadded resource length in bytes
    pub total_length: u64,
    /// Fragment data, blank-padded to the codec capacity
    pub data: Bytes,
}

/// A fully reassembled resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub data: Bytes,
}

/// Outcome of a reassembly attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly {
    /// Every fragment was present
    Complete(Resource),
    /// At least one fragment in `0..=last_index` is missing
    Incomplete,
}

impl Reassembly {
    /// Check if the resource was rebuilt
    pub fn is_complete(&self) -> bool {
        matches!(self, Reassembly::Complete(_))
    }

    /// Get the resource, if complete
    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Reassembly::Complete(resource) => Some(resource),
            Reassembly::Incomplete => None,
        }
    }
}

/// Splits resources into frames and rebuilds them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentCodec {
    capacity: usize,
}

impl FragmentCodec {
    /// Create a codec carrying `capacity` data bytes per frame
    ///
    /// # Panics
    /// Panics if capacity is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "fragment capacity must be at least 1");
        FragmentCodec { capacity }
    }

    /// Data bytes per frame
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of every encoded frame
    pub fn frame_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.capacity
    }

    /// Number of frames `split` produces for a resource of `len` bytes
    pub fn frame_count(&self, len: usize) -> usize {
        ((len + self.capacity - 1) / self.capacity).max(1)
    }

    /// Split a resource into frames, in index order
    ///
    /// An empty resource still yields one (blank) frame.
    pub fn split(&self, name: &str, resource: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        let count = self.frame_count(resource.len());
        let last_index = (count - 1) as u64;
        let total_length = resource.len() as u64;

        let mut frames = Vec::with_capacity(count);
        for index in 0..count {
            let start = (index * self.capacity).min(resource.len());
            let end = (start + self.capacity).min(resource.len());

            let mut frame = BytesMut::with_capacity(self.frame_size());
            put_padded(&mut frame, name.as_bytes(), NAME_SIZE);
            put_decimal(&mut frame, "fragment index", index as u64, INDEX_SIZE)?;
            put_decimal(&mut frame, "last index", last_index, LAST_INDEX_SIZE)?;
            put_decimal(&mut frame, "total length", total_length, TOTAL_LENGTH_SIZE)?;
            frame.put_slice(&resource[start..end]);
            frame.put_bytes(PAD_BYTE, self.capacity - (end - start));
            frames.push(frame.freeze());
        }

        Ok(frames)
    }

    /// Decode a single frame
    pub fn decode(&self, frame: &[u8]) -> Result<Fragment, FramingError> {
        ensure_len(frame, self.frame_size())?;

        let name = String::from_utf8_lossy(trim_blanks(&frame[..NAME_SIZE])).into_owned();
        let index = parse_index(&frame[INDEX_OFFSET..LAST_INDEX_OFFSET], "fragment index")?;
        let last_index = parse_index(&frame[LAST_INDEX_OFFSET..TOTAL_LENGTH_OFFSET], "last index")?;
        let total_length =
            parse_decimal(&frame[TOTAL_LENGTH_OFFSET..FRAME_HEADER_SIZE], "total length")?;

        if index > last_index {
            return Err(FramingError::IndexOutOfRange { index, last_index });
        }

        Ok(Fragment {
            name,
            index,
            last_index,
            total_length,
            data: Bytes::copy_from_slice(&frame[FRAME_HEADER_SIZE..self.frame_size()]),
        })
    }

    /// Rebuild one resource from its frames, in any order
    ///
    /// All frames are expected to belong to the same resource; the name and
    /// last index are taken from the lowest-indexed frame. Duplicates are
    /// harmless. An empty input is `Incomplete`.
    pub fn reassemble<I>(&self, frames: I) -> Result<Reassembly, FramingError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut by_index = BTreeMap::new();
        for frame in frames {
            let fragment = self.decode(frame.as_ref())?;
            by_index.insert(fragment.index, fragment);
        }

        let Some(first) = by_index.values().next() else {
            return Ok(Reassembly::Incomplete);
        };
        let name = first.name.clone();
        let last_index = first.last_index;
        let total_length = first.total_length;

        if !(0..=last_index).all(|index| by_index.contains_key(&index)) {
            return Ok(Reassembly::Incomplete);
        }

        let data = join_fragments(
            by_index.range(..=last_index).map(|(_, fragment)| &fragment.data),
            total_length,
        );
        Ok(Reassembly::Complete(Resource { name, data }))
    }
}

impl Default for FragmentCodec {
    fn default() -> Self {
        FragmentCodec::new(FRAGMENT_CAPACITY)
    }
}

fn parse_index(raw: &[u8], field: &'static str) -> Result<u32, FramingError> {
    let value = parse_decimal(raw, field)?;
    u32::try_from(value).map_err(|_| FramingError::FieldOverflow {
        field,
        value,
        width: raw.len(),
    })
}

/// Concatenate fragment data in order and strip the padding
pub(crate) fn join_fragments<'a>(
    fragments: impl Iterator<Item = &'a Bytes>,
    total_length: u64,
) -> Bytes {
    let mut joined = BytesMut::new();
    for data in fragments {
        joined.put_slice(data);
    }
    let len = usize::try_from(total_length).unwrap_or(usize::MAX);
    joined.truncate(len);
    joined.freeze()
}
