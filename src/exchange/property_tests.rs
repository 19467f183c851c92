//! Property-based tests for the exchange core
//!
//! These use proptest to verify properties that should hold for all inputs.

use proptest::prelude::*;
use std::sync::Arc;

use crate::exchange::{
    BusySpinWaitStrategy, ExchangeError, MultiProducerSequencer, Sequence, SequenceGroup,
    Sequencer, SingleProducerSequencer, WaitStrategy,
};

fn busy_spin() -> Arc<dyn WaitStrategy> {
    Arc::new(BusySpinWaitStrategy::new())
}

mod sequence_properties {
    use super::*;

    proptest! {
        #[test]
        fn get_returns_what_set_stored(value in any::<i64>()) {
            let seq = Sequence::new(0);
            seq.set(value);
            prop_assert_eq!(seq.get(), value);
        }

        #[test]
        fn add_and_get_is_plain_addition(initial in -1_000_000i64..1_000_000, delta in 1i64..1000) {
            let seq = Sequence::new(initial);
            prop_assert_eq!(seq.add_and_get(delta), initial + delta);
            prop_assert_eq!(seq.get(), initial + delta);
        }

        #[test]
        fn compare_and_set_succeeds_on_expected(initial in any::<i64>(), new_value in any::<i64>()) {
            let seq = Sequence::new(initial);
            prop_assert!(seq.compare_and_set(initial, new_value));
            prop_assert_eq!(seq.get(), new_value);
        }

        #[test]
        fn compare_and_set_fails_on_unexpected(
            initial in any::<i64>(),
            wrong in any::<i64>(),
            new_value in any::<i64>(),
        ) {
            prop_assume!(wrong != initial);
            let seq = Sequence::new(initial);
            prop_assert!(!seq.compare_and_set(wrong, new_value));
            prop_assert_eq!(seq.get(), initial);
        }

        #[test]
        fn minimum_sequence_is_true_minimum(values in prop::collection::vec(any::<i64>(), 0..8), bound in any::<i64>()) {
            let sequences: Vec<Arc<Sequence>> =
                values.iter().map(|v| Arc::new(Sequence::new(*v))).collect();
            let expected = values.iter().copied().fold(bound, i64::min);
            prop_assert_eq!(Sequence::minimum_sequence(&sequences, bound), expected);
        }
    }
}

mod claim_properties {
    use super::*;

    proptest! {
        #[test]
        fn single_producer_claims_are_strictly_increasing(
            batches in prop::collection::vec(1i64..8, 1..32),
        ) {
            let sequencer = SingleProducerSequencer::new(1024, busy_spin());
            let mut last = -1i64;
            for n in batches {
                let claimed = sequencer.next_n(n);
                prop_assert!(claimed > last);
                prop_assert_eq!(claimed, last + n);
                last = claimed;
            }
        }

        #[test]
        fn multi_producer_claims_are_strictly_increasing(
            batches in prop::collection::vec(1i64..8, 1..32),
        ) {
            let sequencer = MultiProducerSequencer::new(1024, busy_spin());
            let mut last = -1i64;
            for n in batches {
                let claimed = sequencer.next_n(n);
                prop_assert!(claimed > last);
                last = claimed;
            }
        }

        #[test]
        fn try_next_never_crosses_the_wrap_point(
            buffer_size_pow in 0u32..6,
            consumed in -1i64..32,
        ) {
            let buffer_size = 1usize << buffer_size_pow;
            let sequencer = SingleProducerSequencer::new(buffer_size, busy_spin());
            let consumer = Arc::new(Sequence::new(consumed));
            sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);
            // add_while_running seeds the consumer to the cursor; restore the
            // scenario under test.
            consumer.set(consumed);

            loop {
                match sequencer.try_next() {
                    Ok(sequence) => {
                        prop_assert!(sequence - (buffer_size as i64) < consumed + 1);
                        sequencer.publish(sequence);
                    }
                    Err(ExchangeError::InsufficientCapacity) => break,
                    Err(other) => return Err(TestCaseError::fail(other.to_string())),
                }
            }

            // Once refused, the ring really is full relative to the consumer.
            prop_assert_eq!(sequencer.remaining_capacity(), 0);
        }
    }
}

mod availability_properties {
    use super::*;

    proptest! {
        #[test]
        fn published_round_is_available_and_previous_round_is_not(
            buffer_size_pow in 1u32..8,
            laps in 1i64..4,
        ) {
            let buffer_size = 1i64 << buffer_size_pow;
            let sequencer = MultiProducerSequencer::new(buffer_size as usize, busy_spin());
            let consumer = Arc::new(Sequence::default());
            sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);

            let mut highest = -1i64;
            for _ in 0..laps {
                for _ in 0..buffer_size {
                    let sequence = sequencer.next();
                    sequencer.publish(sequence);
                    highest = sequence;
                    consumer.set(sequence);
                }
            }

            // The whole current lap is available; the same slots one lap ago
            // are not.
            for sequence in (highest - buffer_size + 1)..=highest {
                prop_assert!(sequencer.is_available(sequence));
                if sequence - buffer_size >= 0 {
                    prop_assert!(!sequencer.is_available(sequence - buffer_size));
                }
            }
        }

        #[test]
        fn highest_published_never_exceeds_bound(
            published in prop::collection::btree_set(0i64..16, 0..16),
        ) {
            let sequencer = MultiProducerSequencer::new(16, busy_spin());
            let claimed = sequencer.next_n(16);
            for sequence in &published {
                sequencer.publish(*sequence);
            }

            let highest = sequencer.get_highest_published_sequence(0, claimed);
            prop_assert!(highest <= claimed);
            // Everything up to the reported highest really is published.
            for sequence in 0..=highest {
                prop_assert!(published.contains(&sequence));
            }
            // And the prefix stops exactly at the first gap.
            if highest < claimed {
                prop_assert!(!published.contains(&(highest + 1)));
            }
        }
    }
}

mod gating_properties {
    use super::*;

    proptest! {
        #[test]
        fn add_then_remove_restores_membership(count in 1usize..6) {
            let group = SequenceGroup::new();
            let cursor = Sequence::default();
            let stable: Vec<Arc<Sequence>> =
                (0..count).map(|_| Arc::new(Sequence::default())).collect();
            group.add_while_running(&cursor, &stable);

            let transient = Arc::new(Sequence::default());
            group.add_while_running(&cursor, &[Arc::clone(&transient)]);
            prop_assert_eq!(group.len(), count + 1);

            prop_assert!(group.remove(&transient));
            prop_assert_eq!(group.len(), count);
        }
    }
}
