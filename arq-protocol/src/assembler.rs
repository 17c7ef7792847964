//! Streaming resource reassembly
//!
//! The receive side of the fragment codec. Frames of several resources may
//! arrive interleaved in one delivery stream; the assembler groups them by
//! name and hands back each resource as soon as its last missing fragment
//! arrives.

use crate::fragment::{join_fragments, FragmentCodec, Resource};
use crate::framing::FramingError;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

/// Fragments collected so far for one resource
#[derive(Debug)]
struct PendingResource {
    last_index: u32,
    total_length: u64,
    fragments: BTreeMap<u32, Bytes>,
}

impl PendingResource {
    fn is_complete(&self) -> bool {
        self.fragments.len() as u64 == u64::from(self.last_index) + 1
    }
}

/// Accumulates frames until whole resources can be rebuilt
#[derive(Debug, Default)]
pub struct ResourceAssembler {
    codec: FragmentCodec,
    pending: HashMap<String, PendingResource>,
}

impl ResourceAssembler {
    /// Create an assembler for frames produced by `codec`
    pub fn new(codec: FragmentCodec) -> Self {
        ResourceAssembler {
            codec,
            pending: HashMap::new(),
        }
    }

    /// Add one frame
    ///
    /// Returns the resource once every fragment of it has been seen. Frames
    /// repeating an index already held are ignored.
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Resource>, FramingError> {
        let fragment = self.codec.decode(frame)?;

        let pending = self
            .pending
            .entry(fragment.name.clone())
            .or_insert_with(|| PendingResource {
                last_index: fragment.last_index,
                total_length: fragment.total_length,
                fragments: BTreeMap::new(),
            });

        if fragment.index > pending.last_index {
            return Err(FramingError::IndexOutOfRange {
                index: fragment.index,
                last_index: pending.last_index,
            });
        }
        pending
            .fragments
            .entry(fragment.index)
            .or_insert(fragment.data);

        if !pending.is_complete() {
            tracing::trace!(
                name = %fragment.name,
                held = pending.fragments.len(),
                last_index = pending.last_index,
                "Fragment buffered"
            );
            return Ok(None);
        }

        let Some(done) = self.pending.remove(&fragment.name) else {
            return Ok(None);
        };
        let data = join_fragments(done.fragments.values(), done.total_length);
        tracing::debug!(name = %fragment.name, bytes = data.len(), "Resource reassembled");

        Ok(Some(Resource {
            name: fragment.name,
            data,
        }))
    }

    /// Number of resources with fragments still outstanding
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Missing fragment indices of a pending resource
    pub fn missing(&self, name: &str) -> Option<Vec<u32>> {
        self.pending.get(name).map(|pending| {
            (0..=pending.last_index)
                .filter(|index| !pending.fragments.contains_key(index))
                .collect()
        })
    }
}
