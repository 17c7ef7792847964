//! UDP socket wrapper for the ARQ transport
//!
//! Provides a blocking UDP socket configured through socket2, and the
//! [`DatagramChannel`] trait the transport threads read and write through.

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// Socket errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address")]
    InvalidAddress,

    #[error("Short send: {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },
}

impl SocketError {
    /// Check if this error only means no datagram arrived before the read timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SocketError::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        )
    }

    /// Check if the error is transient and the operation can be retried
    pub fn is_transient(&self) -> bool {
        match self {
            SocketError::Io(e) => matches!(
                e.kind(),
                ErrorKind::WouldBlock
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}

/// An unreliable datagram channel
///
/// `recv_from` should return an error for which [`SocketError::is_timeout`]
/// holds at least every few hundred milliseconds when idle, so that callers
/// blocked in it can notice shutdown.
pub trait DatagramChannel: Send + Sync {
    /// Send one datagram to `target`
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError>;

    /// Receive one datagram, returning its size and source
    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError>;

    /// Local address of the channel
    fn local_addr(&self) -> Result<SocketAddr, SocketError>;
}

/// ARQ socket wrapper
///
/// Wraps a blocking UDP socket. Reads give up after the configured read
/// timeout so receive loops can poll for shutdown.
#[derive(Debug)]
pub struct ArqSocket {
    inner: UdpSocket,
}

impl ArqSocket {
    /// Create a new socket bound to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(false)?;

        let inner: UdpSocket = socket.into();
        tracing::debug!(local = ?inner.local_addr().ok(), "Socket bound");
        Ok(ArqSocket { inner })
    }

    /// Bind and set the read timeout in one step
    pub fn bind_with_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self, SocketError> {
        let socket = Self::bind(addr)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(socket)
    }

    /// Set how long `recv_from` blocks before reporting a timeout
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), SocketError> {
        self.inner.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_send_buffer_size(size)?;
        Ok(())
    }

    /// Set the receive buffer size
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_recv_buffer_size(size)?;
        Ok(())
    }

    /// Get the receive buffer size
    pub fn recv_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(SockRef::from(&self.inner).recv_buffer_size()?)
    }

    /// Try to clone the socket
    pub fn try_clone(&self) -> Result<Self, SocketError> {
        Ok(ArqSocket {
            inner: self.inner.try_clone()?,
        })
    }
}

impl DatagramChannel for ArqSocket {
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        let sent = self.inner.send_to(buf, target)?;
        if sent != buf.len() {
            return Err(SocketError::ShortSend {
                sent,
                expected: buf.len(),
            });
        }
        Ok(sent)
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        Ok(self.inner.recv_from(buf)?)
    }

    fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }
}
