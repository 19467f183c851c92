//! Sequence counters for the exchange
//!
//! A `Sequence` tracks progress through the ring: producers own one as the
//! cursor, every consumer owns one to record how far it has read. These
//! counters are the only shared mutable state in the core, and different
//! threads hammer on neighbouring ones, so each counter is inflated to a full
//! cache line of its own.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::exchange::INITIAL_CURSOR_VALUE;

/// Assumed cache line width; the padding below is sized from it.
const CACHE_LINE_SIZE: usize = 64;

/// A cache-line-isolated progress counter
///
/// The alignment puts the counter at the start of its own cache line and the
/// trailing padding fills the rest, so two sequences owned by different
/// threads can never share a line.
#[repr(align(64))]
pub struct Sequence {
    /// The actual sequence value
    value: AtomicI64,
    /// Padding to fill the rest of the cache line
    _padding: [u8; CACHE_LINE_SIZE - std::mem::size_of::<AtomicI64>()],
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: AtomicI64::new(initial_value),
            _padding: [0; CACHE_LINE_SIZE - std::mem::size_of::<AtomicI64>()],
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Set the sequence value
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Set the sequence value with full-fence semantics
    ///
    /// Used where the new value must be visible to producers re-reading the
    /// gating minimum, not just to acquiring readers of this sequence.
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Compare and set the sequence value
    ///
    /// Returns true if the value was `expected` and is now `new`.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }

    /// Get the minimum value across `sequences` and `minimum`
    ///
    /// Producers use this to compute the gate: the slowest consumer bounded
    /// by their own view of the cursor.
    pub fn minimum_sequence(sequences: &[Arc<Sequence>], minimum: i64) -> i64 {
        sequences
            .iter()
            .map(|seq| seq.get())
            .fold(minimum, i64::min)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence").field("value", &self.get()).finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// The gating-sequence registry
///
/// Holds the consumer sequences that throttle a producer. Membership changes
/// are rare; reads happen on every claim. The vector is guarded by a lock that
/// is only contended while consumers are being attached or detached.
pub struct SequenceGroup {
    sequences: parking_lot::RwLock<Vec<Arc<Sequence>>>,
}

impl SequenceGroup {
    /// Create a new empty sequence group
    pub fn new() -> Self {
        Self {
            sequences: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Add sequences to the group while the ring is running
    ///
    /// Each added sequence is seeded to the cursor before insertion, and
    /// re-seeded after, so a cursor advance between the two steps cannot leave
    /// a stale value throttling the producer retroactively.
    pub fn add_while_running(&self, cursor: &Sequence, to_add: &[Arc<Sequence>]) {
        let mut sequences = self.sequences.write();
        for sequence in to_add {
            sequence.set(cursor.get());
            sequences.push(Arc::clone(sequence));
        }
        let cursor_value = cursor.get();
        for sequence in to_add {
            sequence.set_volatile(cursor_value);
        }
    }

    /// Remove every occurrence of `sequence` from the group
    ///
    /// Returns true if at least one occurrence was removed.
    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let mut sequences = self.sequences.write();
        let before = sequences.len();
        sequences.retain(|s| !Arc::ptr_eq(s, sequence));
        sequences.len() != before
    }

    /// Get the minimum value across the group and `minimum`
    pub fn minimum(&self, minimum: i64) -> i64 {
        let sequences = self.sequences.read();
        Sequence::minimum_sequence(&sequences, minimum)
    }

    /// Get the number of sequences in the group
    pub fn len(&self) -> usize {
        self.sequences.read().len()
    }

    /// Check if the group is empty
    pub fn is_empty(&self) -> bool {
        self.sequences.read().is_empty()
    }
}

impl Default for SequenceGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SequenceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sequences = self.sequences.read();
        f.debug_struct("SequenceGroup")
            .field("len", &sequences.len())
            .finish()
    }
}
