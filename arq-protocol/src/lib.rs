//! ARQ Protocol Core Implementation
//!
//! This crate implements the protocol half of a selective-repeat ARQ transport:
//! the fixed-width segment codec, resource fragmentation and reassembly, the
//! send and receive sliding windows, and the adaptive retransmission timeout.
//! Nothing here performs I/O or spawns threads.

pub mod assembler;
pub mod fragment;
pub mod framing;
pub mod segment;
pub mod sequence;
pub mod timeout;
pub mod window;

pub use assembler::ResourceAssembler;
pub use fragment::{Fragment, FragmentCodec, Reassembly, Resource, FRAGMENT_CAPACITY};
pub use framing::FramingError;
pub use segment::{Segment, SEGMENT_SIZE, TOTAL_SIZE};
pub use sequence::SeqNumber;
pub use timeout::TimeoutEstimator;
pub use window::{AckOutcome, Admission, ReceiveFault, ReceiveWindow, SendWindow, WindowError};
