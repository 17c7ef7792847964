//! Transport statistics

use std::time::Duration;

/// Sender statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenderStats {
    /// Payloads accepted by `enqueue`
    pub payloads_enqueued: u64,
    /// Datagrams written, first transmissions and retransmissions
    pub segments_sent: u64,
    /// Segments queued again after their timer expired
    pub retransmissions: u64,
    /// Acknowledgments accepted
    pub acks_received: u64,
    /// Acknowledgments below the window base
    pub stale_acks: u64,
    /// Acknowledgments for sequences already acknowledged
    pub duplicate_acks: u64,
    /// Out-of-window, unsent, foreign or malformed acknowledgments
    pub faults: u64,
    /// Bytes written to the socket
    pub bytes_sent: u64,
    /// Current retransmission timeout
    pub timeout: Duration,
    /// Oldest unacknowledged sequence number
    pub window_base: u64,
    /// Segments awaiting acknowledgment
    pub in_flight: usize,
    /// Events dropped because the event channel was full
    pub events_dropped: u64,
}

/// Receiver statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverStats {
    /// Segments accepted into the window
    pub segments_received: u64,
    /// Segments already buffered or already delivered
    pub duplicates: u64,
    /// Segments moved to the in-order queue
    pub delivered: u64,
    /// Segments handed to the consumer
    pub consumed: u64,
    /// Out-of-window, foreign or malformed datagrams
    pub faults: u64,
    /// Acknowledgments written
    pub acks_sent: u64,
    /// Bytes read from the socket
    pub bytes_received: u64,
    /// Next sequence number to deliver
    pub window_base: u64,
    /// Out-of-order segments held
    pub buffered: usize,
    /// Events dropped because the event channel was full
    pub events_dropped: u64,
}
