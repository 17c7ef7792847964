//! Property-based tests for resource fragmentation
//!
//! Splitting a resource and reassembling its frames returns the original
//! bytes for any frame order and any number of duplicates, and any strict
//! subset of the frames stays incomplete.

use arq_protocol::assembler::ResourceAssembler;
use arq_protocol::fragment::{FragmentCodec, Reassembly, FRAGMENT_CAPACITY, NAME_SIZE};
use arq_protocol::segment::SEGMENT_SIZE;
use bytes::Bytes;
use proptest::prelude::*;
use proptest::sample::Index;

// Property test strategies

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9_.]{1,20}"
}

fn resource_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        prop::collection::vec(any::<u8>(), 1..=600),
    ]
}

fn capacity_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![1usize..=64, Just(FRAGMENT_CAPACITY)]
}

/// A resource with its frames in a random order
fn shuffled_frames() -> impl Strategy<Value = (String, Vec<u8>, FragmentCodec, Vec<Bytes>)> {
    (name_strategy(), resource_strategy(), capacity_strategy()).prop_flat_map(
        |(name, resource, capacity)| {
            let codec = FragmentCodec::new(capacity);
            let frames = codec.split(&name, &resource).unwrap();
            (
                Just(name),
                Just(resource),
                Just(codec),
                Just(frames).prop_shuffle(),
            )
        },
    )
}

// Property tests

proptest! {
    #[test]
    fn prop_split_frame_layout(
        name in name_strategy(),
        resource in resource_strategy(),
        capacity in capacity_strategy(),
    ) {
        let codec = FragmentCodec::new(capacity);
        let frames = codec.split(&name, &resource).unwrap();

        let expected_count = if resource.is_empty() {
            1
        } else {
            (resource.len() + capacity - 1) / capacity
        };
        prop_assert_eq!(frames.len(), expected_count);

        for (index, frame) in frames.iter().enumerate() {
            prop_assert_eq!(frame.len(), codec.frame_size());

            let fragment = codec.decode(frame).unwrap();
            prop_assert_eq!(&fragment.name, &name);
            prop_assert_eq!(fragment.index as usize, index);
            prop_assert_eq!(fragment.last_index as usize, expected_count - 1);
            prop_assert_eq!(fragment.total_length as usize, resource.len());
        }
    }

    #[test]
    fn prop_reassemble_any_order_with_duplicates(
        (name, resource, codec, mut frames) in shuffled_frames(),
        duplicates in prop::collection::vec(any::<Index>(), 0..4),
    ) {
        for index in duplicates {
            let duplicate = frames[index.index(frames.len())].clone();
            frames.push(duplicate);
        }

        let reassembled = codec.reassemble(&frames).unwrap().into_resource().unwrap();
        prop_assert_eq!(reassembled.name, name);
        prop_assert_eq!(&reassembled.data[..], &resource[..]);
    }

    #[test]
    fn prop_strict_subset_incomplete(
        (_name, _resource, codec, mut frames) in shuffled_frames(),
        missing in any::<Index>(),
        keep in any::<Index>(),
    ) {
        let missing = missing.index(frames.len());
        frames.remove(missing);
        // keep an arbitrary prefix of what is left
        let keep = if frames.is_empty() { 0 } else { keep.index(frames.len() + 1) };
        frames.truncate(keep);

        prop_assert_eq!(codec.reassemble(&frames).unwrap(), Reassembly::Incomplete);
    }

    #[test]
    fn prop_assembler_interleaved(
        name_a in name_strategy(),
        resource_a in resource_strategy(),
        resource_b in resource_strategy(),
        picks in prop::collection::vec(any::<bool>(), 0..64),
    ) {
        let codec = FragmentCodec::default();
        let name_b = format!("{}~", &name_a[..name_a.len().min(NAME_SIZE - 1)]);
        let frames_a = codec.split(&name_a, &resource_a).unwrap();
        let frames_b = codec.split(&name_b, &resource_b).unwrap();

        let mut assembler = ResourceAssembler::new(codec);
        let mut done = Vec::new();
        let (mut a, mut b) = (frames_a.iter(), frames_b.iter());
        let mut picks = picks.into_iter();
        loop {
            let frame = match picks.next() {
                Some(true) => a.next().or_else(|| b.next()),
                _ => b.next().or_else(|| a.next()),
            };
            let Some(frame) = frame else { break };
            if let Some(resource) = assembler.push(frame).unwrap() {
                done.push(resource);
            }
        }

        prop_assert_eq!(done.len(), 2);
        prop_assert_eq!(assembler.pending_count(), 0);
        for resource in done {
            if resource.name == name_a {
                prop_assert_eq!(&resource.data[..], &resource_a[..]);
            } else {
                prop_assert_eq!(&resource.name, &name_b);
                prop_assert_eq!(&resource.data[..], &resource_b[..]);
            }
        }
    }
}

#[test]
fn test_small_01_scenario() {
    let codec = FragmentCodec::new(477);
    let resource: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();

    let frames = codec.split("small_01", &resource).unwrap();
    assert_eq!(frames.len(), 3);
    for (index, frame) in frames.iter().enumerate() {
        let fragment = codec.decode(frame).unwrap();
        assert_eq!(fragment.index as usize, index);
        assert_eq!(fragment.last_index, 2);
        assert_eq!(fragment.total_length, 1000);
    }

    let arrival = vec![
        frames[2].clone(),
        frames[0].clone(),
        frames[1].clone(),
        frames[1].clone(),
    ];
    let resource_out = codec.reassemble(&arrival).unwrap().into_resource().unwrap();
    assert_eq!(resource_out.name, "small_01");
    assert_eq!(&resource_out.data[..], &resource[..]);
}

#[test]
fn test_default_frames_fill_one_segment() {
    let codec = FragmentCodec::default();
    assert_eq!(codec.frame_size(), SEGMENT_SIZE);

    let frames = codec.split("exact", &vec![7u8; FRAGMENT_CAPACITY * 2]).unwrap();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|frame| frame.len() == SEGMENT_SIZE));
}
