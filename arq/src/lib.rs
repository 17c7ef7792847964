//! ARQ - Selective-repeat reliable transport over UDP
//!
//! High-level API: [`ArqSender`] and [`ArqReceiver`] each own one socket and
//! the threads driving one side of a session with a single peer.
//!
//! ```no_run
//! use arq::{ArqConfig, ArqReceiver, ArqSender};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), arq::TransportError> {
//! let receiver = ArqReceiver::bind("127.0.0.1:0".parse().unwrap(), ArqConfig::default())?;
//! let sender = ArqSender::bind(
//!     "127.0.0.1:0".parse().unwrap(),
//!     receiver.local_addr()?,
//!     ArqConfig::default(),
//! )?;
//!
//! sender.enqueue(&b"hello"[..])?;
//! let payloads = receiver.receive(1)?;
//! assert_eq!(&payloads[0][..5], b"hello");
//! sender.wait_drained(Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

pub use arq_io as io;
pub use arq_protocol as protocol;

pub mod config;
pub mod error;
pub mod event;
pub mod peer;
pub mod receiver;
pub mod sender;
pub mod stats;

pub use config::ArqConfig;
pub use error::TransportError;
pub use event::TransportEvent;
pub use peer::{PeerBinding, PeerCheck};
pub use receiver::ArqReceiver;
pub use sender::ArqSender;
pub use stats::{ReceiverStats, SenderStats};

// Re-export commonly used types
pub use protocol::{FragmentCodec, ResourceAssembler, Segment, SeqNumber};
