//! Ring buffer
//!
//! The ring buffer owns the preallocated slot array and fronts the whole
//! exchange: claiming, slot access, publication, barrier creation, and the
//! gating registry. Slot contents are opaque to the core; access is
//! serialized entirely by the claim-then-publish protocol, so the storage
//! itself needs no locks.

use std::cell::UnsafeCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::exchange::{
    is_power_of_two, EventFactory, EventTranslator, EventTranslatorOneArg, EventTranslatorThreeArg,
    EventTranslatorTwoArg, ExchangeError, MultiProducerSequencer, ProcessingSequenceBarrier,
    ProducerType, Result, Sequence, SequenceBarrier, Sequencer, SingleProducerSequencer,
    WaitStrategy,
};

/// The preallocated event ring
///
/// # Type Parameters
/// * `T` - The event type stored in the slots
pub struct RingBuffer<T> {
    /// Slot storage. `UnsafeCell` because the claiming producer writes a slot
    /// while other threads hold shared references to the buffer; the
    /// claim-then-publish protocol guarantees exclusivity per slot.
    slots: Box<[UnsafeCell<T>]>,
    /// Mask for slot lookup, `buffer_size - 1`
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
}

// SAFETY: the slot array uses UnsafeCell, but all mutation is funneled
// through the claim protocol: only the producer holding sequence `s` writes
// slot `s & mask`, and no reader touches it until `publish(s)` has been
// observed through an acquire load. The sequences themselves are atomic.
unsafe impl<T: Send + Sync> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T>
where
    T: Send + Sync,
{
    /// Create a ring fed by exactly one producer thread
    ///
    /// # Errors
    /// Returns [`ExchangeError::InvalidBufferSize`] unless `buffer_size` is a
    /// power of two ≥ 1.
    pub fn create_single_producer<F>(
        factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::create(ProducerType::Single, factory, buffer_size, wait_strategy)
    }

    /// Create a ring fed by any number of producer threads
    ///
    /// # Errors
    /// Returns [`ExchangeError::InvalidBufferSize`] unless `buffer_size` is a
    /// power of two ≥ 1.
    pub fn create_multi_producer<F>(
        factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::create(ProducerType::Multi, factory, buffer_size, wait_strategy)
    }

    /// Create a ring with the given producer mode
    ///
    /// The factory is invoked exactly once per slot; slots are recycled in
    /// place forever after.
    ///
    /// # Errors
    /// Returns [`ExchangeError::InvalidBufferSize`] unless `buffer_size` is a
    /// power of two ≥ 1.
    pub fn create<F>(
        producer_type: ProducerType,
        factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        if !is_power_of_two(buffer_size) {
            return Err(ExchangeError::InvalidBufferSize(buffer_size));
        }

        let sequencer: Arc<dyn Sequencer> = match producer_type {
            ProducerType::Single => Arc::new(SingleProducerSequencer::new(
                buffer_size,
                Arc::clone(&wait_strategy),
            )),
            ProducerType::Multi => Arc::new(MultiProducerSequencer::new(
                buffer_size,
                Arc::clone(&wait_strategy),
            )),
        };

        let slots: Box<[UnsafeCell<T>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(factory.new_instance()))
            .collect();

        Ok(Self {
            slots,
            index_mask: (buffer_size - 1) as i64,
            sequencer,
            wait_strategy,
        })
    }

    #[inline]
    fn slot_ptr(&self, sequence: i64) -> *mut T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: the mask keeps the index within bounds.
        unsafe { self.slots.get_unchecked(index) }.get()
    }

    /// Get the event at `sequence`, waiting until it has been published
    ///
    /// On a multi-producer ring the cursor alone does not mean the slot is
    /// written; this spins on the per-slot availability marker.
    pub fn get(&self, sequence: i64) -> &T {
        while !self.sequencer.is_available(sequence) {
            std::hint::spin_loop();
        }
        // SAFETY: publication was observed with acquire semantics, so the
        // producer's slot write happened-before this read, and no producer
        // will touch the slot again until the ring wraps past every gating
        // consumer.
        unsafe { &*self.slot_ptr(sequence) }
    }

    /// Get the preallocated event at `sequence` without waiting
    ///
    /// This is the producer-side accessor for writing a claimed slot before
    /// publishing it.
    ///
    /// # Safety
    /// The caller must hold the unpublished claim on `sequence`; only then is
    /// the slot exclusively theirs.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_preallocated(&self, sequence: i64) -> &mut T {
        &mut *self.slot_ptr(sequence)
    }

    /// Claim the next sequence, waiting for capacity if the ring is full
    pub fn next(&self) -> i64 {
        self.sequencer.next()
    }

    /// Claim the next `n` contiguous sequences, waiting for capacity
    pub fn next_n(&self, n: i64) -> i64 {
        self.sequencer.next_n(n)
    }

    /// Try to claim the next sequence without waiting
    ///
    /// # Errors
    /// Returns [`ExchangeError::InsufficientCapacity`] if the ring is full.
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Try to claim the next `n` contiguous sequences without waiting
    ///
    /// # Errors
    /// Returns [`ExchangeError::InsufficientCapacity`] if the ring is full.
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Announce that a claimed sequence is readable
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Announce that the claimed range `low..=high` is readable
    pub fn publish_range(&self, low: i64, high: i64) {
        self.sequencer.publish_range(low, high);
    }

    /// Seed the cursor before any consumers are attached
    ///
    /// The seed is published immediately: consumers created afterwards start
    /// reading at `sequence + 1`.
    ///
    /// # Errors
    /// Returns [`ExchangeError::IllegalState`] once gating sequences exist,
    /// or on a multi-producer ring.
    pub fn initialise_to(&self, sequence: i64) -> Result<()> {
        self.sequencer.claim(sequence)?;
        self.sequencer.publish(sequence);
        Ok(())
    }

    /// Create a barrier for a consumer depending on `sequences_to_track`
    ///
    /// Pass no sequences for a first-stage consumer that only tracks the
    /// cursor.
    pub fn new_barrier(&self, sequences_to_track: &[Arc<Sequence>]) -> Arc<dyn SequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            self.sequencer.get_cursor(),
            Arc::clone(&self.wait_strategy),
            sequences_to_track.to_vec(),
            Arc::clone(&self.sequencer),
        ))
    }

    /// Attach consumer sequences that gate the producers
    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    /// Detach a gating sequence; returns true if it was attached
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Get the current cursor value
    pub fn get_cursor(&self) -> i64 {
        self.sequencer.get_cursor().get()
    }

    /// Get the cursor sequence itself
    pub fn cursor_sequence(&self) -> Arc<Sequence> {
        self.sequencer.get_cursor()
    }

    /// Get the ring size in slots
    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    /// Check whether `sequence` has been published
    pub fn is_available(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Check whether `required_capacity` slots can be claimed without waiting
    pub fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.sequencer.has_available_capacity(required_capacity)
    }

    /// Get the number of slots currently claimable without waiting
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Claim a sequence, run the translator on its slot, and publish
    ///
    /// Waits for capacity if the ring is full.
    ///
    /// # Errors
    /// Returns [`ExchangeError::TranslatorFault`] if the translator panics;
    /// the sequence is published regardless.
    pub fn publish_event<TR>(&self, translator: TR) -> Result<i64>
    where
        TR: EventTranslator<T>,
    {
        let sequence = self.sequencer.next();
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence);
        })
    }

    /// Like [`publish_event`](Self::publish_event) with one argument
    pub fn publish_event_one_arg<TR, A>(&self, translator: TR, arg0: A) -> Result<i64>
    where
        TR: EventTranslatorOneArg<T, A>,
    {
        let sequence = self.sequencer.next();
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence, arg0);
        })
    }

    /// Like [`publish_event`](Self::publish_event) with two arguments
    pub fn publish_event_two_arg<TR, A, B>(&self, translator: TR, arg0: A, arg1: B) -> Result<i64>
    where
        TR: EventTranslatorTwoArg<T, A, B>,
    {
        let sequence = self.sequencer.next();
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence, arg0, arg1);
        })
    }

    /// Like [`publish_event`](Self::publish_event) with three arguments
    pub fn publish_event_three_arg<TR, A, B, C>(
        &self,
        translator: TR,
        arg0: A,
        arg1: B,
        arg2: C,
    ) -> Result<i64>
    where
        TR: EventTranslatorThreeArg<T, A, B, C>,
    {
        let sequence = self.sequencer.next();
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence, arg0, arg1, arg2);
        })
    }

    /// Try to claim, translate, and publish without waiting
    ///
    /// Refuses unless `required_capacity` slots are free, so a caller
    /// planning a burst can reserve headroom up front.
    ///
    /// # Errors
    /// [`ExchangeError::InsufficientCapacity`] if the headroom is not there;
    /// [`ExchangeError::TranslatorFault`] if the translator panics (the
    /// claimed sequence is published regardless).
    pub fn try_publish_event<TR>(&self, translator: TR, required_capacity: i64) -> Result<i64>
    where
        TR: EventTranslator<T>,
    {
        let sequence = self.try_claim(required_capacity)?;
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence);
        })
    }

    /// Like [`try_publish_event`](Self::try_publish_event) with one argument
    pub fn try_publish_event_one_arg<TR, A>(
        &self,
        translator: TR,
        required_capacity: i64,
        arg0: A,
    ) -> Result<i64>
    where
        TR: EventTranslatorOneArg<T, A>,
    {
        let sequence = self.try_claim(required_capacity)?;
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence, arg0);
        })
    }

    /// Like [`try_publish_event`](Self::try_publish_event) with two arguments
    pub fn try_publish_event_two_arg<TR, A, B>(
        &self,
        translator: TR,
        required_capacity: i64,
        arg0: A,
        arg1: B,
    ) -> Result<i64>
    where
        TR: EventTranslatorTwoArg<T, A, B>,
    {
        let sequence = self.try_claim(required_capacity)?;
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence, arg0, arg1);
        })
    }

    /// Like [`try_publish_event`](Self::try_publish_event) with three arguments
    pub fn try_publish_event_three_arg<TR, A, B, C>(
        &self,
        translator: TR,
        required_capacity: i64,
        arg0: A,
        arg1: B,
        arg2: C,
    ) -> Result<i64>
    where
        TR: EventTranslatorThreeArg<T, A, B, C>,
    {
        let sequence = self.try_claim(required_capacity)?;
        self.translate_and_publish(sequence, |event, sequence| {
            translator.translate_to(event, sequence, arg0, arg1, arg2);
        })
    }

    fn try_claim(&self, required_capacity: i64) -> Result<i64> {
        if !self.sequencer.has_available_capacity(required_capacity) {
            return Err(ExchangeError::InsufficientCapacity);
        }
        self.sequencer.try_next()
    }

    fn translate_and_publish<F>(&self, sequence: i64, translate: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: `sequence` was claimed by this caller and is not yet
            // published, so the slot is exclusively ours.
            let event = unsafe { &mut *self.slot_ptr(sequence) };
            translate(event, sequence);
        }));

        // Publish on the failure path too: an uncommitted claim would leave
        // every consumer waiting on this sequence stuck forever.
        self.sequencer.publish(sequence);

        match outcome {
            Ok(()) => Ok(sequence),
            Err(_) => Err(ExchangeError::TranslatorFault),
        }
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.slots.len())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}
