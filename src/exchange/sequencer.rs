//! Sequencers
//!
//! A sequencer hands out ring sequences to producers without ever letting a
//! claim overtake the slowest gating consumer, and answers the consumer-side
//! question "is sequence `s` readable yet?". Two implementations cover the
//! two producer modes chosen at construction:
//!
//! - [`SingleProducerSequencer`]: one producer thread, no CAS on the claim
//!   path. The cursor is the highest *published* sequence.
//! - [`MultiProducerSequencer`]: any number of producer threads, CAS claim
//!   loop plus a per-slot availability buffer. The cursor is the highest
//!   *claimed* sequence; readability of an individual slot is a separate
//!   question answered by the availability buffer.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_utils::CachePadded;

use crate::exchange::{
    is_power_of_two, ExchangeError, Result, Sequence, SequenceGroup, WaitStrategy,
    INITIAL_CURSOR_VALUE,
};

/// Coordinates claiming and publication of ring sequences
pub trait Sequencer: Send + Sync + std::fmt::Debug {
    /// Get the cursor sequence
    ///
    /// Highest published sequence for single-producer rings, highest claimed
    /// for multi-producer rings.
    fn get_cursor(&self) -> Arc<Sequence>;

    /// Get the ring size in slots
    fn get_buffer_size(&self) -> usize;

    /// Claim the next sequence, waiting for capacity if the ring is full
    fn next(&self) -> i64 {
        self.next_n(1)
    }

    /// Claim the next `n` contiguous sequences, waiting for capacity
    ///
    /// Returns the highest claimed sequence. The claim spans
    /// `returned - n + 1 ..= returned`.
    fn next_n(&self, n: i64) -> i64;

    /// Try to claim the next sequence without waiting
    ///
    /// # Errors
    /// Returns [`ExchangeError::InsufficientCapacity`] if the claim would
    /// have to wait on a gating consumer.
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Try to claim the next `n` contiguous sequences without waiting
    ///
    /// # Errors
    /// Returns [`ExchangeError::InsufficientCapacity`] if the claim would
    /// have to wait on a gating consumer.
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Seed the sequencer to `sequence` without claiming through the gate
    ///
    /// Administrative: only legal before any gating sequence is attached.
    ///
    /// # Errors
    /// Returns [`ExchangeError::IllegalState`] once consumers are attached,
    /// or on a multi-producer ring (the availability buffer has no meaningful
    /// pre-population for an arbitrary seed).
    fn claim(&self, sequence: i64) -> Result<()>;

    /// Announce that a previously claimed sequence is readable
    fn publish(&self, sequence: i64);

    /// Announce that the previously claimed range `low..=high` is readable
    fn publish_range(&self, low: i64, high: i64);

    /// Check whether `sequence` is readable
    fn is_available(&self, sequence: i64) -> bool;

    /// Find the highest readable sequence in `next_sequence..=available_sequence`
    /// reachable without a gap
    fn get_highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64;

    /// Check whether `required_capacity` slots can be claimed without waiting
    fn has_available_capacity(&self, required_capacity: i64) -> bool;

    /// Get the number of slots currently claimable without waiting
    fn remaining_capacity(&self) -> i64;

    /// Attach consumer sequences that gate this sequencer
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Detach a gating sequence; returns true if it was attached
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Get the minimum of the gating sequences and the cursor
    fn get_minimum_sequence(&self) -> i64;
}

fn check_claim_batch(n: i64, buffer_size: usize) {
    assert!(
        n >= 1 && n <= buffer_size as i64,
        "claim batch must be within 1..=buffer_size"
    );
}

/// Single producer sequencer
///
/// The claim path touches no shared atomics beyond the occasional gating
/// re-read: `next_value` and the cached gate live in plain counters that only
/// the one producer thread writes. The caller contract is exactly that: one
/// producer thread.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    /// Highest claimed sequence. Single-writer; relaxed ordering is enough.
    next_value: CachePadded<AtomicI64>,
    /// Last observed minimum of the gating sequences. Single-writer.
    cached_gating_sequence: CachePadded<AtomicI64>,
    gating_sequences: SequenceGroup,
}

impl SingleProducerSequencer {
    /// Create a new single producer sequencer
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        assert!(
            is_power_of_two(buffer_size),
            "buffer size must be a power of 2"
        );
        Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            next_value: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            cached_gating_sequence: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            gating_sequences: SequenceGroup::new(),
        }
    }

    /// Gate check shared by `try_next_n` and `has_available_capacity`.
    /// Refreshes the cached gate on a miss.
    fn has_capacity(&self, required_capacity: i64) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = (next_value + required_capacity) - self.buffer_size as i64;
        let cached_gating_sequence = self.cached_gating_sequence.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            let min_sequence = self.gating_sequences.minimum(next_value);
            self.cached_gating_sequence
                .store(min_sequence, Ordering::Relaxed);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn next_n(&self, n: i64) -> i64 {
        check_claim_batch(n, self.buffer_size);

        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating_sequence = self.cached_gating_sequence.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            loop {
                let min_sequence = self.gating_sequences.minimum(next_value);
                if wrap_point <= min_sequence {
                    self.cached_gating_sequence
                        .store(min_sequence, Ordering::Relaxed);
                    break;
                }
                // Full ring: pause until the slowest consumer moves.
                thread::yield_now();
            }
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        next_sequence
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        check_claim_batch(n, self.buffer_size);

        if !self.has_capacity(n) {
            return Err(ExchangeError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn claim(&self, sequence: i64) -> Result<()> {
        if !self.gating_sequences.is_empty() {
            return Err(ExchangeError::IllegalState(
                "cannot claim a sequence once gating sequences are attached",
            ));
        }
        self.next_value.store(sequence, Ordering::Relaxed);
        Ok(())
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: i64, high: i64) {
        // Publication order equals claim order with one producer, so the
        // range collapses to its upper bound.
        self.publish(high);
    }

    fn is_available(&self, sequence: i64) -> bool {
        sequence <= self.cursor.get()
    }

    fn get_highest_published_sequence(&self, _next_sequence: i64, available_sequence: i64) -> i64 {
        // Everything at or below the cursor is necessarily written.
        available_sequence
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.has_capacity(required_capacity)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let consumed = self.gating_sequences.minimum(next_value);
        self.buffer_size as i64 - (next_value - consumed)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating_sequences
            .add_while_running(&self.cursor, gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating_sequences.remove(sequence)
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.gating_sequences.minimum(self.cursor.get())
    }
}

/// Multi producer sequencer
///
/// Any number of producer threads claim through a CAS loop on the cursor.
/// Because claims commit out of order, each slot carries its publication
/// round in the availability buffer; consumers advance only over the
/// contiguous prefix of published slots.
#[derive(Debug)]
pub struct MultiProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating_sequences: SequenceGroup,
    /// Non-authoritative cache of the gating minimum, refreshed on a miss.
    gating_sequence_cache: CachePadded<AtomicI64>,
    /// Per-slot publication round: `sequence >> index_shift` once published.
    available_buffer: Box<[AtomicI32]>,
    index_mask: usize,
    index_shift: u32,
}

impl MultiProducerSequencer {
    /// Create a new multi producer sequencer
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        assert!(
            is_power_of_two(buffer_size),
            "buffer size must be a power of 2"
        );

        let available_buffer: Box<[AtomicI32]> =
            (0..buffer_size).map(|_| AtomicI32::new(-1)).collect();

        Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating_sequences: SequenceGroup::new(),
            gating_sequence_cache: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            available_buffer,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
        }
    }

    #[inline]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence as usize) & self.index_mask
    }

    #[inline]
    fn calculate_availability_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].store(flag, Ordering::Release);
    }

    /// Gate check against `cursor_value`. Refreshes the cache on a miss.
    fn has_capacity_from(&self, cursor_value: i64, required_capacity: i64) -> bool {
        let wrap_point = (cursor_value + required_capacity) - self.buffer_size as i64;
        let cached_gating_sequence = self.gating_sequence_cache.load(Ordering::Acquire);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > cursor_value {
            let min_sequence = self.gating_sequences.minimum(cursor_value);
            self.gating_sequence_cache
                .store(min_sequence, Ordering::Release);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for MultiProducerSequencer {
    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn next_n(&self, n: i64) -> i64 {
        check_claim_batch(n, self.buffer_size);

        loop {
            let current = self.cursor.get();
            let next_sequence = current + n;
            let wrap_point = next_sequence - self.buffer_size as i64;
            let cached_gating_sequence = self.gating_sequence_cache.load(Ordering::Acquire);

            if wrap_point > cached_gating_sequence || cached_gating_sequence > current {
                let gating_sequence = self.gating_sequences.minimum(current);

                if wrap_point > gating_sequence {
                    // Full ring: pause until the slowest consumer moves,
                    // then re-read the cursor from scratch.
                    thread::yield_now();
                    continue;
                }

                self.gating_sequence_cache
                    .store(gating_sequence, Ordering::Release);
            } else if self.cursor.compare_and_set(current, next_sequence) {
                return next_sequence;
            }
        }
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        check_claim_batch(n, self.buffer_size);

        loop {
            let current = self.cursor.get();
            let next_sequence = current + n;

            if !self.has_capacity_from(current, n) {
                return Err(ExchangeError::InsufficientCapacity);
            }

            if self.cursor.compare_and_set(current, next_sequence) {
                return Ok(next_sequence);
            }
            // Lost the CAS to another producer; re-check the gate and retry.
        }
    }

    fn claim(&self, _sequence: i64) -> Result<()> {
        Err(ExchangeError::IllegalState(
            "claim is only supported on single producer rings",
        ))
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: i64, high: i64) {
        for sequence in low..=high {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].load(Ordering::Acquire) == flag
    }

    fn get_highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64 {
        let mut sequence = next_sequence;
        while sequence <= available_sequence {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
            sequence += 1;
        }
        available_sequence
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.has_capacity_from(self.cursor.get(), required_capacity)
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
        let consumed = self.gating_sequences.minimum(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating_sequences
            .add_while_running(&self.cursor, gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating_sequences.remove(sequence)
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.gating_sequences.minimum(self.cursor.get())
    }
}
