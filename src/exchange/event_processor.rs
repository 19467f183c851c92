//! Batch event processor
//!
//! A consumer driver: owns one consumer [`Sequence`], pulls contiguous
//! batches from a barrier, dispatches each event to a handler, then advances
//! its sequence so producers (and downstream stages) can move on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::exchange::internal_log::diag;
use crate::exchange::{
    EventHandler, ExchangeError, RingBuffer, Sequence, SequenceBarrier,
};

const COMPONENT: &str = "batch_event_processor";

/// Drives one [`EventHandler`] from a sequence barrier
///
/// Run it on a dedicated thread; stop it with [`halt`](Self::halt) from any
/// other thread. The processor's sequence is what gets registered as a gating
/// sequence on the ring (and as a dependency of downstream stages).
pub struct BatchEventProcessor<T>
where
    T: Send + Sync,
{
    ring: Arc<RingBuffer<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<Box<dyn EventHandler<T>>>,
    sequence: Arc<Sequence>,
    running: AtomicBool,
}

impl<T> BatchEventProcessor<T>
where
    T: Send + Sync,
{
    /// Create a new processor reading `ring` through `barrier`
    pub fn new(
        ring: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: Box<dyn EventHandler<T>>,
    ) -> Self {
        Self {
            ring,
            barrier,
            handler: Mutex::new(handler),
            sequence: Arc::new(Sequence::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Get this processor's consumer sequence
    ///
    /// Register it with [`RingBuffer::add_gating_sequences`] before starting,
    /// and pass it to [`RingBuffer::new_barrier`] for downstream stages.
    pub fn get_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    /// Check if the processor is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the processor, waking it if it is blocked on the barrier
    pub fn halt(&self) {
        diag!(Debug, COMPONENT, self.sequence.get(), "halt requested");
        self.running.store(false, Ordering::Release);
        self.barrier.alert();
    }

    /// Process events until halted
    ///
    /// Blocks the calling thread. Returns after [`halt`](Self::halt) once the
    /// in-flight batch has been dispatched.
    pub fn run(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            diag!(Warn, COMPONENT, self.sequence.get(), "started twice; ignoring");
            return;
        }
        self.barrier.clear_alert();

        let mut handler = self.handler.lock();
        handler.on_start();

        let mut next_sequence = self.sequence.get() + 1;
        loop {
            // A halt between the clear_alert above and the wait below must
            // not be lost.
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            match self.barrier.wait_for(next_sequence) {
                Ok(available_sequence) => {
                    while next_sequence <= available_sequence {
                        let event = self.ring.get(next_sequence);
                        let end_of_batch = next_sequence == available_sequence;
                        if let Err(error) = handler.on_event(event, next_sequence, end_of_batch) {
                            diag!(Error, COMPONENT, next_sequence, "event handler failed: {error}");
                        }
                        next_sequence += 1;
                    }
                    self.sequence.set(available_sequence);
                }
                Err(ExchangeError::Alert) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    // Alerted but not halted: someone else owns the alert.
                    // Keep the sequence where it is and retry.
                    self.barrier.clear_alert();
                }
                Err(error) => {
                    diag!(Error, COMPONENT, next_sequence, "barrier wait failed: {error}");
                    break;
                }
            }
        }

        handler.on_shutdown();
        diag!(Info, COMPONENT, self.sequence.get(), "stopped");
        self.running.store(false, Ordering::Release);
    }
}

impl<T> std::fmt::Debug for BatchEventProcessor<T>
where
    T: Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEventProcessor")
            .field("sequence", &self.sequence)
            .field("running", &self.is_running())
            .finish()
    }
}
