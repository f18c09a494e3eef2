//! Property-based checks of the core invariants: conservation, FIFO/LIFO
//! order per producer, no duplication/loss, and the WOULDBLOCK
//! round-trip contract. Gated behind the `verification` feature, the
//! same way the rest of the corpus scopes its proptest suites.

#![cfg(feature = "verification")]

use std::collections::HashSet;

use proptest::prelude::*;

use wfds::node::Node;
use wfds::{Wfcq, Wfs};

proptest! {
    #[test]
    fn wfcq_conserves_and_preserves_fifo_order(batches in prop::collection::vec(0u32..500, 1..50)) {
        let q = Wfcq::new();
        for &value in &batches {
            q.enqueue(Box::new(Node::new(value)));
        }

        let mut drained = Vec::new();
        while let Some(node) = q.dequeue() {
            drained.push(node.into_inner());
        }

        prop_assert_eq!(drained, batches);
        prop_assert!(q.is_empty());
    }

    #[test]
    fn wfs_conserves_and_reverses_push_order(batches in prop::collection::vec(0u32..500, 1..50)) {
        let s = Wfs::new();
        for &value in &batches {
            s.push(Box::new(Node::new(value)));
        }

        let mut chain = s.pop_all().expect("non-empty after at least one push");
        let mut drained = Vec::new();
        while let Some(node) = chain.pop_front() {
            drained.push(node.into_inner());
        }

        let expected: Vec<u32> = batches.into_iter().rev().collect();
        prop_assert_eq!(drained, expected);
        prop_assert!(s.is_empty());
    }

    #[test]
    fn wfcq_splice_loses_nothing(src_values in prop::collection::vec(0u32..500, 0..30),
                                  dest_values in prop::collection::vec(500u32..1000, 0..30)) {
        let dest = Wfcq::new();
        for &v in &dest_values {
            dest.enqueue(Box::new(Node::new(v)));
        }
        let src = Wfcq::new();
        for &v in &src_values {
            src.enqueue(Box::new(Node::new(v)));
        }

        dest.splice(&src);
        prop_assert!(src.is_empty());

        let mut drained = Vec::new();
        while let Some(node) = dest.dequeue() {
            drained.push(node.into_inner());
        }

        let mut expected = dest_values;
        expected.extend(src_values);
        prop_assert_eq!(drained, expected);
    }

    #[test]
    fn wfcq_no_duplication_no_loss_across_random_enqueue_order(values in prop::collection::hash_set(0u32..10_000, 1..200)) {
        let q = Wfcq::new();
        for &v in &values {
            q.enqueue(Box::new(Node::new(v)));
        }

        let mut seen = HashSet::new();
        while let Some(node) = q.dequeue() {
            prop_assert!(seen.insert(node.into_inner()));
        }
        prop_assert_eq!(seen, values);
    }

    #[test]
    fn wfcq_wouldblock_round_trip_resolves_to_node_or_empty(values in prop::collection::vec(0u32..500, 0..20)) {
        let q = Wfcq::new();
        for &v in &values {
            q.enqueue(Box::new(Node::new(v)));
        }

        // try_dequeue on a fully quiescent queue never observes an
        // in-flight window, so it must agree with the blocking variant.
        loop {
            match q.try_dequeue() {
                Ok(Some(node)) => { drop(node); }
                Ok(None) => break,
                Err(_would_block) => {
                    // A subsequent blocking call must resolve to a node
                    // or empty, never WOULDBLOCK again.
                    match q.dequeue() {
                        Some(node) => drop(node),
                        None => break,
                    }
                }
            }
        }
        prop_assert!(q.is_empty());
    }
}
