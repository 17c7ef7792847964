//! Sending half of the ARQ transport
//!
//! ```text
//!  enqueue ─▶ pending ─▶ [fill] ─▶ outbound ─▶ [tx] ─▶ socket
//!                          ▲           ▲         │ arm
//!              slot freed  │           │ resend  ▼
//!  socket ─▶ [ack] ─▶ SendWindow ◀──────────── [timer]
//! ```
//!
//! The fill thread moves payloads from the unbounded pending queue into free
//! window slots. The tx thread is the only writer on the socket and arms a
//! retransmission timer for every datagram it writes. The ack thread applies
//! acknowledgments to the window. A single timer thread requeues any segment
//! still unacknowledged when its deadline passes.

use crate::config::ArqConfig;
use crate::error::TransportError;
use crate::event::{EventEmitter, TransportEvent};
use crate::peer::{PeerBinding, PeerCheck};
use crate::stats::SenderStats;
use arq_io::{ArqSocket, DatagramChannel, TimerHandle, TimerQueue};
use arq_protocol::{AckOutcome, FramingError, Segment, SendWindow, SeqNumber, SEGMENT_SIZE};
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Datagram buffer size, comfortably above one encoded segment
const RECV_BUFFER_SIZE: usize = 2048;

struct SenderState {
    window: SendWindow,
    stats: SenderStats,
    failure: Option<String>,
}

struct SenderShared {
    state: Mutex<SenderState>,
    /// Signalled when the window base moves or the sender stops
    progress: Condvar,
    running: AtomicBool,
    /// Payloads accepted by `enqueue`, which is also the sequence number
    /// the window base reaches once all of them are acknowledged
    enqueued: AtomicU64,
    channel: Arc<dyn DatagramChannel>,
    peer: SocketAddr,
    binding: PeerBinding,
    events: EventEmitter,
    outbound: Sender<Segment>,
    poll_interval: Duration,
}

impl SenderShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn status(&self, state: &SenderState) -> Result<(), TransportError> {
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
        self.progress.notify_all();
    }

    fn fail(&self, reason: String) {
        tracing::error!(peer = %self.peer, %reason, "Sender failed");
        {
            let mut state = self.state.lock();
            if state.failure.is_none() {
                state.failure = Some(reason.clone());
            }
            self.running.store(false, Ordering::Release);
            self.progress.notify_all();
        }
        self.events.emit(TransportEvent::Failed { reason });
    }
}

/// Reliable, ordered sender for one peer
///
/// Payloads handed to [`enqueue`](Self::enqueue) are numbered in call order
/// and retransmitted until acknowledged. Dropping the sender closes it;
/// call [`wait_drained`](Self::wait_drained) first to let in-flight data
/// finish.
pub struct ArqSender {
    shared: Arc<SenderShared>,
    pending: Sender<Bytes>,
    timer: Option<TimerQueue<SeqNumber>>,
    threads: Vec<JoinHandle<()>>,
}

impl ArqSender {
    /// Bind a UDP socket at `local` and start sending to `peer`
    pub fn bind(
        local: SocketAddr,
        peer: SocketAddr,
        config: ArqConfig,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let socket = ArqSocket::bind_with_timeout(local, config.poll_interval)?;
        Self::start(Arc::new(socket), peer, config)
    }

    /// Start sending to `peer` over an existing channel
    ///
    /// Acknowledgments are only accepted from `peer`.
    pub fn start(
        channel: Arc<dyn DatagramChannel>,
        peer: SocketAddr,
        config: ArqConfig,
    ) -> Result<Self, TransportError> {
        config.validate()?;

        let (pending_tx, pending_rx) = channel::unbounded();
        let (outbound_tx, outbound_rx) = channel::unbounded();

        tracing::info!(
            local = ?channel.local_addr().ok(),
            %peer,
            window = config.window_size,
            "Sender started"
        );

        let shared = Arc::new(SenderShared {
            state: Mutex::new(SenderState {
                window: SendWindow::new(config.window_size, config.estimator()),
                stats: SenderStats::default(),
                failure: None,
            }),
            progress: Condvar::new(),
            running: AtomicBool::new(true),
            enqueued: AtomicU64::new(0),
            channel,
            peer,
            binding: PeerBinding::bound(peer),
            events: EventEmitter::new(config.event_capacity),
            outbound: outbound_tx,
            poll_interval: config.poll_interval,
        });

        let timer_shared = Arc::clone(&shared);
        let timer = TimerQueue::spawn("arq-send-timer", move |seq| {
            on_retransmit_timer(&timer_shared, seq)
        })?;
        let tx_timer = timer.handle();
        let ack_timer = timer.handle();

        let mut sender = ArqSender {
            shared,
            pending: pending_tx,
            timer: Some(timer),
            threads: Vec::with_capacity(3),
        };
        sender.spawn_worker("arq-send-fill", move |shared| fill_loop(shared, pending_rx))?;
        sender.spawn_worker("arq-send-tx", move |shared| {
            transmit_loop(shared, outbound_rx, tx_timer)
        })?;
        sender.spawn_worker("arq-send-ack", move |shared| ack_loop(shared, ack_timer))?;

        Ok(sender)
    }

    fn spawn_worker<F>(&mut self, name: &str, work: F) -> Result<(), TransportError>
    where
        F: FnOnce(&SenderShared) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || work(&shared))?;
        self.threads.push(handle);
        Ok(())
    }

    /// Queue a payload for reliable delivery
    ///
    /// Never blocks. Payloads longer than one segment are rejected.
    pub fn enqueue(&self, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        let payload = payload.into();
        if payload.len() > SEGMENT_SIZE {
            return Err(FramingError::PayloadTooLarge {
                size: payload.len(),
                max: SEGMENT_SIZE,
            }
            .into());
        }
        self.shared.status(&self.shared.state.lock())?;

        self.shared.enqueued.fetch_add(1, Ordering::AcqRel);
        self.pending
            .send(payload)
            .map_err(|_| TransportError::Closed)
    }

    /// Block until every enqueued payload is acknowledged
    ///
    /// Returns `Ok(false)` if `timeout` passes first.
    pub fn wait_drained(&self, timeout: Duration) -> Result<bool, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if self.is_drained(&state) {
                return Ok(true);
            }
            self.shared.status(&state)?;
            if self
                .shared
                .progress
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Ok(self.is_drained(&state));
            }
        }
    }

    fn is_drained(&self, state: &SenderState) -> bool {
        state.window.base().as_raw() >= self.shared.enqueued.load(Ordering::Acquire)
    }

    /// Snapshot of the sender statistics
    pub fn stats(&self) -> SenderStats {
        let state = self.shared.state.lock();
        SenderStats {
            payloads_enqueued: self.shared.enqueued.load(Ordering::Acquire),
            timeout: state.window.timeout(),
            window_base: state.window.base().as_raw(),
            in_flight: state.window.in_flight_count(),
            events_dropped: self.shared.events.dropped(),
            ..state.stats.clone()
        }
    }

    /// Current retransmission timeout
    pub fn timeout(&self) -> Duration {
        self.shared.state.lock().window.timeout()
    }

    /// Receiver for fault and lifecycle events
    pub fn events(&self) -> Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// The destination address
    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer
    }

    /// The local address of the underlying channel
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.shared.channel.local_addr()?)
    }

    /// Check if the sender is still running
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stop all threads and wait for them to exit
    ///
    /// Unacknowledged segments are abandoned.
    pub fn close(&mut self) {
        if self.threads.is_empty() && self.timer.is_none() {
            return;
        }
        self.shared.stop();

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Sender thread panicked");
            }
        }
        if let Some(mut timer) = self.timer.take() {
            timer.shutdown();
        }
        tracing::info!(peer = %self.shared.peer, "Sender closed");
    }
}

impl Drop for ArqSender {
    fn drop(&mut self) {
        self.close();
    }
}

fn fill_loop(shared: &SenderShared, pending: Receiver<Bytes>) {
    while shared.is_running() {
        let payload = match pending.recv_timeout(shared.poll_interval) {
            Ok(payload) => payload,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut state = shared.state.lock();
        loop {
            if !shared.is_running() {
                return;
            }
            if state.window.has_free_slot() || state.window.next_seq().is_none() {
                break;
            }
            shared.progress.wait_for(&mut state, shared.poll_interval);
        }

        let admitted = state.window.admit(payload, Instant::now());
        drop(state);

        match admitted {
            Ok(segment) => {
                tracing::trace!(seq = %segment.seq(), "Segment constructed");
                if shared.outbound.send(segment).is_err() {
                    break;
                }
            }
            Err(err) => {
                shared.fail(format!("cannot admit payload: {}", err));
                break;
            }
        }
    }
}

fn transmit_loop(shared: &SenderShared, outbound: Receiver<Segment>, timer: TimerHandle<SeqNumber>) {
    while shared.is_running() {
        let segment = match outbound.recv_timeout(shared.poll_interval) {
            Ok(segment) => segment,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let seq = segment.seq();

        let sent = match shared.channel.send_to(&segment.to_bytes(), shared.peer) {
            Ok(sent) => sent,
            Err(err) if err.is_transient() => {
                // the timer below retries it
                tracing::debug!(%seq, error = %err, "Transient send failure");
                0
            }
            Err(err) => {
                shared.fail(format!("send failed: {}", err));
                break;
            }
        };

        let timeout = {
            let mut state = shared.state.lock();
            if sent > 0 {
                state.stats.segments_sent += 1;
                state.stats.bytes_sent += sent as u64;
            }
            state.window.timeout()
        };
        timer.schedule(seq, timeout);
        tracing::trace!(%seq, ?timeout, "Segment dispatched");
    }
}

fn ack_loop(shared: &SenderShared, timer: TimerHandle<SeqNumber>) {
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

        if let PeerCheck::Mismatch { expected } = shared.binding.admit(from) {
            tracing::warn!(%expected, actual = %from, "Ack from unexpected peer discarded");
            shared.state.lock().stats.faults += 1;
            shared.events.emit(TransportEvent::PeerMismatch {
                expected,
                actual: from,
            });
            continue;
        }

        match Segment::from_bytes(&buf[..len]) {
            Ok(ack) => handle_ack(shared, ack.seq(), &timer),
            Err(error) => {
                tracing::warn!(%from, %error, "Malformed ack discarded");
                shared.state.lock().stats.faults += 1;
                shared.events.emit(TransportEvent::Framing { from, error });
            }
        }
    }
}

fn handle_ack(shared: &SenderShared, seq: SeqNumber, timer: &TimerHandle<SeqNumber>) {
    let outcome = {
        let mut state = shared.state.lock();
        let outcome = state.window.on_ack(seq, Instant::now());
        match outcome {
            AckOutcome::Accepted { .. } => state.stats.acks_received += 1,
            AckOutcome::Stale { .. } => state.stats.stale_acks += 1,
            AckOutcome::Duplicate { .. } => state.stats.duplicate_acks += 1,
            AckOutcome::OutOfWindow { .. } | AckOutcome::NotSent { .. } => {
                state.stats.faults += 1
            }
        }
        outcome
    };

    match outcome {
        AckOutcome::Accepted { seq, rtt, advanced } => {
            timer.cancel(seq);
            tracing::debug!(%seq, ?rtt, advanced, "Ack accepted");
            if advanced {
                shared.progress.notify_all();
            }
        }
        AckOutcome::Stale { seq, base } => {
            tracing::debug!(%seq, %base, "Stale ack ignored");
        }
        AckOutcome::Duplicate { seq } => {
            tracing::debug!(%seq, "Duplicate ack ignored");
            shared.events.emit(TransportEvent::DuplicateAck { seq });
        }
        AckOutcome::OutOfWindow { seq, base, size } => {
            tracing::warn!(%seq, %base, size, "Ack outside the send window");
            shared
                .events
                .emit(TransportEvent::OutOfWindow { seq, base, size });
        }
        AckOutcome::NotSent { seq } => {
            tracing::warn!(%seq, "Ack for a segment never sent");
            shared.events.emit(TransportEvent::UnsentAck { seq });
        }
    }
}

fn on_retransmit_timer(shared: &SenderShared, seq: SeqNumber) {
    if !shared.is_running() {
        return;
    }

    let resend = {
        let mut state = shared.state.lock();
        let segment = state.window.outstanding(seq).cloned();
        if segment.is_some() {
            state.stats.retransmissions += 1;
        }
        segment.map(|segment| (segment, state.window.timeout()))
    };
    let Some((segment, timeout)) = resend else {
        return;
    };

    tracing::debug!(%seq, ?timeout, "Retransmission timer expired");
    shared
        .events
        .emit(TransportEvent::Retransmit { seq, timeout });
    let _ = shared.outbound.send(segment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use arq_protocol::TOTAL_SIZE;
    use std::net::UdpSocket;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn fast_config() -> ArqConfig {
        ArqConfig::default()
            .with_window_size(8)
            .with_initial_timeout(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(10))
    }

    /// A bare socket standing in for the receiver
    fn fake_peer() -> UdpSocket {
        let socket = UdpSocket::bind(loopback()).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    }

    fn recv_segment(socket: &UdpSocket) -> (Segment, SocketAddr) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (len, from) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(len, TOTAL_SIZE);
        (Segment::from_bytes(&buf[..len]).unwrap(), from)
    }

    #[test]
    fn test_sends_in_sequence_and_drains() {
        let peer = fake_peer();
        let sender = ArqSender::bind(loopback(), peer.local_addr().unwrap(), fast_config()).unwrap();

        sender.enqueue(&b"first"[..]).unwrap();
        sender.enqueue(&b"second"[..]).unwrap();

        let (first, from) = recv_segment(&peer);
        let (second, _) = recv_segment(&peer);
        assert_eq!(first.seq(), SeqNumber::new(0));
        assert_eq!(second.seq(), SeqNumber::new(1));
        assert_eq!(&first.payload()[..5], b"first");

        for seq in [1, 0] {
            peer.send_to(&Segment::ack(SeqNumber::new(seq)).to_bytes(), from)
                .unwrap();
        }

        assert!(sender.wait_drained(Duration::from_secs(2)).unwrap());
        let stats = sender.stats();
        assert_eq!(stats.payloads_enqueued, 2);
        assert_eq!(stats.acks_received, 2);
        assert_eq!(stats.window_base, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn test_retransmits_until_acked() {
        let peer = fake_peer();
        let sender = ArqSender::bind(loopback(), peer.local_addr().unwrap(), fast_config()).unwrap();
        let events = sender.events();

        sender.enqueue(&b"lonely"[..]).unwrap();

        let (original, from) = recv_segment(&peer);
        let (resent, _) = recv_segment(&peer);
        assert_eq!(original, resent);

        peer.send_to(&Segment::ack(original.seq()).to_bytes(), from)
            .unwrap();
        assert!(sender.wait_drained(Duration::from_secs(2)).unwrap());
        assert!(sender.stats().retransmissions >= 1);

        let retransmit = events
            .try_iter()
            .any(|event| matches!(event, TransportEvent::Retransmit { .. }));
        assert!(retransmit);
    }

    #[test]
    fn test_out_of_window_ack_reported() {
        let peer = fake_peer();
        // no retransmission events ahead of the fault
        let config = fast_config().with_initial_timeout(Duration::from_secs(5));
        let sender = ArqSender::bind(loopback(), peer.local_addr().unwrap(), config).unwrap();
        let events = sender.events();

        sender.enqueue(&b"x"[..]).unwrap();
        let (_, from) = recv_segment(&peer);
        peer.send_to(&Segment::ack(SeqNumber::new(100)).to_bytes(), from)
            .unwrap();

        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            event,
            TransportEvent::OutOfWindow {
                seq: SeqNumber::new(100),
                base: SeqNumber::new(0),
                size: 8
            }
        );
        assert_eq!(sender.stats().faults, 1);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let peer = fake_peer();
        let sender = ArqSender::bind(loopback(), peer.local_addr().unwrap(), fast_config()).unwrap();

        let result = sender.enqueue(vec![b'x'; SEGMENT_SIZE + 1]);
        assert!(matches!(
            result,
            Err(TransportError::Framing(FramingError::PayloadTooLarge { .. }))
        ));
        assert_eq!(sender.stats().payloads_enqueued, 0);
    }

    #[test]
    fn test_enqueue_after_close() {
        let peer = fake_peer();
        let mut sender =
            ArqSender::bind(loopback(), peer.local_addr().unwrap(), fast_config()).unwrap();

        sender.close();
        assert!(!sender.is_running());
        assert!(matches!(
            sender.enqueue(&b"late"[..]),
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            sender.wait_drained(Duration::from_millis(10)),
            Ok(true)
        ));
    }

    #[test]
    fn test_wait_drained_times_out() {
        let peer = fake_peer();
        let sender = ArqSender::bind(loopback(), peer.local_addr().unwrap(), fast_config()).unwrap();

        sender.enqueue(&b"never acked"[..]).unwrap();
        assert!(!sender.wait_drained(Duration::from_millis(100)).unwrap());
    }

    #[test]
    fn test_invalid_config() {
        let result = ArqSender::bind(
            loopback(),
            "127.0.0.1:9".parse().unwrap(),
            ArqConfig::default().with_window_size(0),
        );
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }
}
