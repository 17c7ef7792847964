//! Transport errors

use arq_io::SocketError;
use arq_protocol::{FramingError, WindowError};
use thiserror::Error;

/// Errors returned by the transport API
///
/// Protocol faults that the session survives (bad datagrams, foreign peers,
/// stale acknowledgments) are reported as
/// [`TransportEvent`](crate::TransportEvent)s instead.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Transport failed: {0}")]
    Failed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
