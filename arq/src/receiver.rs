//! Receiving half of the ARQ transport
//!
//! One thread reads the socket, checks the source against the peer binding,
//! admits segments into the [`ReceiveWindow`] and acknowledges them. It is
//! also the only writer on the socket. Consumers block in
//! [`ArqReceiver::receive`] until enough in-order segments are available.

use crate::config::ArqConfig;
use crate::error::TransportError;
use crate::event::{EventEmitter, TransportEvent};
use crate::peer::{PeerBinding, PeerCheck};
use crate::stats::ReceiverStats;
use arq_io::{ArqSocket, DatagramChannel};
use arq_protocol::{ReceiveFault, ReceiveWindow, Segment, SeqNumber};
use bytes::Bytes;
use crossbeam::channel::Receiver;
use parking_lot::{Condvar, Mutex};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const RECV_BUFFER_SIZE: usize = 2048;

struct ReceiverState {
    window: ReceiveWindow,
    stats: ReceiverStats,
    failure: Option<String>,
}

impl ReceiverState {
    fn take(&mut self, count: usize) -> Option<Vec<Bytes>> {
        let segments = self.window.take(count)?;
        self.stats.consumed += segments.len() as u64;
        Some(segments.into_iter().map(Segment::into_payload).collect())
    }
}

struct ReceiverShared {
    state: Mutex<ReceiverState>,
    /// Signalled when segments become deliverable or the receiver stops
    delivered: Condvar,
    running: AtomicBool,
    channel: Arc<dyn DatagramChannel>,
    binding: PeerBinding,
    events: EventEmitter,
}

impl ReceiverShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn status(&self, state: &ReceiverState) -> Result<(), TransportError> {
        if let Some(reason) = &state.failure {
            return Err(TransportError::Failed(reason.clone()));
        }
        if !self.is_running() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn stop(&self) {
        let _state = self.state.lock();
        self.running.store(false, Ordering::Release);
        self.delivered.notify_all();
    }

    fn fail(&self, reason: String) {
        tracing::error!(peer = ?self.binding.peer(), %reason, "Receiver failed");
        {
            let mut state = self.state.lock();
            if state.failure.is_none() {
                state.failure = Some(reason.clone());
            }
            self.running.store(false, Ordering::Release);
            self.delivered.notify_all();
        }
        self.events.emit(TransportEvent::Failed { reason });
    }
}

/// What the receive thread does with an admitted or refused segment
enum Verdict {
    Accepted { delivered: usize },
    Duplicate,
    OutOfWindow { base: SeqNumber, size: u64 },
}

/// Reliable, ordered receiver for one peer
///
/// The peer is whoever sends the first datagram. Dropping the receiver
/// closes it.
pub struct ArqReceiver {
    shared: Arc<ReceiverShared>,
    thread: Option<JoinHandle<()>>,
}

impl ArqReceiver {
    /// Bind a UDP socket at `local` and start receiving
    pub fn bind(local: SocketAddr, config: ArqConfig) -> Result<Self, TransportError> {
        config.validate()?;
        let socket = ArqSocket::bind_with_timeout(local, config.poll_interval)?;
        Self::start(Arc::new(socket), config)
    }

    /// Start receiving on an existing channel
    pub fn start(
        channel: Arc<dyn DatagramChannel>,
        config: ArqConfig,
    ) -> Result<Self, TransportError> {
        config.validate()?;

        tracing::info!(
            local = ?channel.local_addr().ok(),
            window = config.window_size,
            "Receiver started"
        );

        let shared = Arc::new(ReceiverShared {
            state: Mutex::new(ReceiverState {
                window: ReceiveWindow::new(config.window_size),
                stats: ReceiverStats::default(),
                failure: None,
            }),
            delivered: Condvar::new(),
            running: AtomicBool::new(true),
            channel,
            binding: PeerBinding::unbound(),
            events: EventEmitter::new(config.event_capacity),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("arq-recv".to_string())
            .spawn(move || receive_loop(&worker))?;

        Ok(ArqReceiver {
            shared,
            thread: Some(thread),
        })
    }

    /// Block until `count` in-order payloads are available and take them
    ///
    /// Payloads keep their blank padding to the full segment size. Returns
    /// [`TransportError::Closed`] if the receiver stops first.
    pub fn receive(&self, count: usize) -> Result<Vec<Bytes>, TransportError> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(payloads) = state.take(count) {
                return Ok(payloads);
            }
            self.shared.status(&state)?;
            self.shared.delivered.wait(&mut state);
        }
    }

    /// Like [`receive`](Self::receive), but gives up after `timeout`
    pub fn receive_timeout(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Option<Vec<Bytes>>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(payloads) = state.take(count) {
                return Ok(Some(payloads));
            }
            self.shared.status(&state)?;
            if self
                .shared
                .delivered
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Ok(state.take(count));
            }
        }
    }

    /// Number of in-order payloads ready to be taken
    pub fn available(&self) -> usize {
        self.shared.state.lock().window.deliverable_len()
    }

    /// The peer, once the first datagram has arrived
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.binding.peer()
    }

    /// The local address of the underlying channel
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.shared.channel.local_addr()?)
    }

    /// Snapshot of the receiver statistics
    pub fn stats(&self) -> ReceiverStats {
        let state = self.shared.state.lock();
        ReceiverStats {
            window_base: state.window.base().as_raw(),
            buffered: state.window.buffered_len(),
            events_dropped: self.shared.events.dropped(),
            ..state.stats.clone()
        }
    }

    /// Receiver for fault and lifecycle events
    pub fn events(&self) -> Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// Check if the receiver is still running
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stop the receive thread and wait for it to exit
    ///
    /// Payloads already delivered can still be taken afterwards.
    pub fn close(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shared.stop();
        if thread.join().is_err() {
            tracing::warn!("Receiver thread panicked");
        }
        tracing::info!(peer = ?self.shared.binding.peer(), "Receiver closed");
    }
}

impl Drop for ArqReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop(shared: &ReceiverShared) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    while shared.is_running() {
        let (len, from) = match shared.channel.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if err.is_transient() => continue,
            Err(err) => {
                shared.fail(format!("receive failed: {}", err));
                break;
            }
        };

        match shared.binding.admit(from) {
            PeerCheck::Bound => {
                tracing::info!(peer = %from, "Peer bound");
                shared.events.emit(TransportEvent::PeerBound { peer: from });
            }
            PeerCheck::Matched => {}
            PeerCheck::Mismatch { expected } => {
                tracing::warn!(%expected, actual = %from, "Datagram from unexpected peer discarded");
                shared.state.lock().stats.faults += 1;
                shared.events.emit(TransportEvent::PeerMismatch {
                    expected,
                    actual: from,
                });
                continue;
            }
        }

        let segment = match Segment::from_bytes(&buf[..len]) {
            Ok(segment) => segment,
            Err(error) => {
                tracing::warn!(%from, %error, "Malformed segment discarded");
                shared.state.lock().stats.faults += 1;
                shared.events.emit(TransportEvent::Framing { from, error });
                continue;
            }
        };
        let seq = segment.seq();

        let verdict = {
            let mut state = shared.state.lock();
            state.stats.bytes_received += len as u64;
            let admitted = state.window.admit(segment);
            let verdict = match admitted {
                Ok(admission) if admission.duplicate => {
                    state.stats.duplicates += 1;
                    Verdict::Duplicate
                }
                Ok(admission) => {
                    state.stats.segments_received += 1;
                    state.stats.delivered += admission.delivered as u64;
                    Verdict::Accepted {
                        delivered: admission.delivered,
                    }
                }
                Err(ReceiveFault::BelowWindow { .. }) => {
                    state.stats.duplicates += 1;
                    Verdict::Duplicate
                }
                Err(ReceiveFault::BeyondWindow { base, size, .. }) => {
                    state.stats.faults += 1;
                    Verdict::OutOfWindow { base, size }
                }
            };
            // counted before the ack leaves so a snapshot never trails the wire
            if !matches!(verdict, Verdict::OutOfWindow { .. }) {
                state.stats.acks_sent += 1;
            }
            verdict
        };

        match verdict {
            Verdict::Accepted { delivered } => {
                tracing::trace!(%seq, delivered, "Segment accepted");
                if delivered > 0 {
                    shared.delivered.notify_all();
                }
            }
            Verdict::Duplicate => {
                // the earlier ack may have been lost
                tracing::debug!(%seq, "Duplicate segment, acknowledging again");
                shared.events.emit(TransportEvent::DuplicateSegment { seq });
            }
            Verdict::OutOfWindow { base, size } => {
                tracing::warn!(%seq, %base, size, "Segment outside the receive window dropped");
                shared
                    .events
                    .emit(TransportEvent::OutOfWindow { seq, base, size });
                continue;
            }
        }

        match shared.channel.send_to(&Segment::ack(seq).to_bytes(), from) {
            Ok(_) => {}
            Err(err) if err.is_transient() => {
                tracing::debug!(%seq, error = %err, "Transient ack send failure");
                shared.state.lock().stats.acks_sent -= 1;
            }
            Err(err) => {
                shared.state.lock().stats.acks_sent -= 1;
                shared.fail(format!("ack send failed: {}", err));
                break;
            }
        }
    }
}
