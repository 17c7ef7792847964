//! ARQ I/O and Platform Abstraction
//!
//! This crate provides the datagram socket the transport runs over and the
//! deadline queue that drives retransmissions.

pub mod socket;
pub mod timer;

pub use socket::{ArqSocket, DatagramChannel, SocketError};
pub use timer::{TimerHandle, TimerQueue};
