//! Property-based tests for the sliding windows and the timeout estimator

use arq_protocol::segment::Segment;
use arq_protocol::sequence::SeqNumber;
use arq_protocol::timeout::TimeoutEstimator;
use arq_protocol::window::{AckOutcome, ReceiveWindow, SendWindow};
use bytes::Bytes;
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn segment(seq: u64) -> Segment {
    Segment::new(SeqNumber::new(seq), Bytes::from(seq.to_string())).unwrap()
}

/// A receive window whose base has been moved to `base` by in-order arrivals
fn receive_window_at(size: u64, base: u64) -> ReceiveWindow {
    let mut window = ReceiveWindow::new(size);
    for seq in 0..base {
        window.admit(segment(seq)).unwrap();
    }
    window
}

fn permutation(len: u64) -> impl Strategy<Value = Vec<u64>> {
    Just((0..len).collect::<Vec<u64>>()).prop_shuffle()
}

proptest! {
    #[test]
    fn prop_receive_admission_bounds(
        size in 1u64..32,
        base in 0u64..64,
        seq in 0u64..128,
    ) {
        let mut window = receive_window_at(size, base);
        let before = (window.base(), window.buffered_len(), window.deliverable_len());

        let result = window.admit(segment(seq));
        let in_window = base <= seq && seq < base + size;
        prop_assert_eq!(result.is_ok(), in_window);

        if !in_window {
            let after = (window.base(), window.buffered_len(), window.deliverable_len());
            prop_assert_eq!(before, after);
        }
    }

    #[test]
    fn prop_in_order_delivery_any_arrival(
        (size, order) in (1u64..64).prop_flat_map(|size| (Just(size), permutation(size))),
    ) {
        let mut window = ReceiveWindow::new(size);
        for &seq in &order {
            window.admit(segment(seq)).unwrap();
        }

        prop_assert_eq!(window.base(), SeqNumber::new(size));
        prop_assert_eq!(window.buffered_len(), 0);

        let delivered: Vec<u64> = window
            .take(size as usize)
            .unwrap()
            .iter()
            .map(|segment| segment.seq().as_raw())
            .collect();
        prop_assert_eq!(delivered, (0..size).collect::<Vec<u64>>());
    }

    #[test]
    fn prop_duplicates_never_redelivered(
        (size, order) in (1u64..32).prop_flat_map(|size| (Just(size), permutation(size))),
        repeats in prop::collection::vec(0u64..32, 0..16),
    ) {
        let mut window = ReceiveWindow::new(size);
        for &seq in order.iter().chain(repeats.iter().filter(|&&seq| seq < size)) {
            let _ = window.admit(segment(seq));
        }

        prop_assert_eq!(window.deliverable_len() as u64, size);
        prop_assert!(window.take(size as usize + 1).is_none());
    }

    #[test]
    fn prop_send_base_tracks_first_unacked(
        (size, acks) in (1u64..48).prop_flat_map(|size| (Just(size), permutation(size))),
    ) {
        let now = Instant::now();
        let mut window = SendWindow::new(size, TimeoutEstimator::default());
        for _ in 0..size {
            window.admit(Bytes::from_static(b"data"), now).unwrap();
        }
        prop_assert!(!window.has_free_slot());

        let mut acked = vec![false; size as usize];
        for &seq in &acks {
            let outcome = window.on_ack(SeqNumber::new(seq), now);
            let is_accepted = matches!(outcome, AckOutcome::Accepted { .. });
            prop_assert!(is_accepted);
            acked[seq as usize] = true;

            let first_unacked = acked.iter().position(|&done| !done).unwrap_or(size as usize);
            prop_assert_eq!(window.base(), SeqNumber::new(first_unacked as u64));
        }

        prop_assert!(window.is_idle());
        prop_assert!(window.has_free_slot());
    }

    #[test]
    fn prop_send_admission_bounded_by_window(
        size in 1u64..32,
        attempts in 0u64..64,
    ) {
        let now = Instant::now();
        let mut window = SendWindow::new(size, TimeoutEstimator::default());

        let admitted = (0..attempts)
            .filter(|_| window.admit(Bytes::from_static(b"x"), now).is_ok())
            .count() as u64;
        prop_assert_eq!(admitted, attempts.min(size));
        prop_assert_eq!(window.in_flight_count() as u64, attempts.min(size));
    }

    #[test]
    fn prop_timeout_converges(latency_ms in 1u64..5_000) {
        let latency = Duration::from_millis(latency_ms);
        let mut estimator = TimeoutEstimator::default();
        for _ in 0..300 {
            estimator.update(latency);
        }

        let error = (estimator.timeout().as_secs_f64() - latency.as_secs_f64()).abs();
        prop_assert!(error < 1e-6, "timeout {:?} vs latency {:?}", estimator.timeout(), latency);
    }

    #[test]
    fn prop_timeout_never_exceeds_cap(
        samples in prop::collection::vec(0u64..120_000, 1..64),
    ) {
        let mut estimator = TimeoutEstimator::default();
        for sample in samples {
            estimator.update(Duration::from_millis(sample));
            prop_assert!(estimator.timeout() <= Duration::from_secs(10));
        }
    }
}

#[test]
fn test_ack_scenario_window_four() {
    let now = Instant::now();
    let mut window = SendWindow::new(4, TimeoutEstimator::default());
    for _ in 0..4 {
        window.admit(Bytes::from_static(b"seg"), now).unwrap();
    }

    window.on_ack(SeqNumber::new(2), now);
    assert_eq!(window.base(), SeqNumber::new(0));
    window.on_ack(SeqNumber::new(0), now);
    assert_eq!(window.base(), SeqNumber::new(1));
    window.on_ack(SeqNumber::new(1), now);
    assert_eq!(window.base(), SeqNumber::new(3));
}
