//! Sequence barriers
//!
//! A barrier is the consumer-side view of the ring: it waits until a target
//! sequence is both published and cleared by every upstream dependency, and
//! it carries the alert flag that cancels a blocked consumer.

use std::sync::Arc;

use crate::exchange::{AlertSignal, Result, Sequence, Sequencer, WaitStrategy};

/// Coordination point between the cursor, upstream consumers, and one
/// downstream consumer
pub trait SequenceBarrier: Send + Sync {
    /// Wait for `sequence` to become readable
    ///
    /// Returns the highest readable sequence, which may be larger than
    /// requested; the caller processes the whole contiguous batch. A value
    /// below `sequence` means the wait was cut short and the caller decides
    /// what to do with the partial progress.
    ///
    /// # Errors
    /// Returns [`ExchangeError::Alert`](crate::exchange::ExchangeError::Alert)
    /// if the barrier is alerted before or during the wait.
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// Get the cursor this barrier tracks
    fn get_cursor(&self) -> Arc<Sequence>;

    /// Check if this barrier has been alerted
    fn is_alerted(&self) -> bool;

    /// Alert the barrier, waking any blocked consumer
    fn alert(&self);

    /// Clear the alert so the barrier can be waited on again
    fn clear_alert(&self);

    /// Fail with `Alert` if the barrier has been alerted
    fn check_alert(&self) -> Result<()>;
}

/// Standard barrier implementation
///
/// Tracks the producer cursor plus the sequences of any upstream consumer
/// stages. The wait strategy does the idling; the barrier re-checks
/// publication with the sequencer afterwards, which matters on multi-producer
/// rings where a cursor advance does not yet mean the slot is written.
pub struct ProcessingSequenceBarrier {
    cursor: Arc<Sequence>,
    wait_strategy: Arc<dyn WaitStrategy>,
    dependent_sequences: Vec<Arc<Sequence>>,
    alert: AlertSignal,
    sequencer: Arc<dyn Sequencer>,
}

impl ProcessingSequenceBarrier {
    /// Create a new barrier
    ///
    /// `dependent_sequences` are the sequences of upstream stages this
    /// consumer must stay behind; empty for a first-stage consumer.
    pub fn new(
        cursor: Arc<Sequence>,
        wait_strategy: Arc<dyn WaitStrategy>,
        dependent_sequences: Vec<Arc<Sequence>>,
        sequencer: Arc<dyn Sequencer>,
    ) -> Self {
        Self {
            cursor,
            wait_strategy,
            dependent_sequences,
            alert: AlertSignal::new(),
            sequencer,
        }
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.alert.check()?;

        let available_sequence = self.wait_strategy.wait_for(
            sequence,
            &self.cursor,
            &self.dependent_sequences,
            &self.alert,
        )?;

        if available_sequence < sequence {
            return Ok(available_sequence);
        }

        Ok(self
            .sequencer
            .get_highest_published_sequence(sequence, available_sequence))
    }

    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn is_alerted(&self) -> bool {
        self.alert.is_raised()
    }

    fn alert(&self) {
        self.alert.raise();
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alert.clear();
    }

    fn check_alert(&self) -> Result<()> {
        self.alert.check()
    }
}

impl std::fmt::Debug for ProcessingSequenceBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSequenceBarrier")
            .field("cursor", &self.cursor)
            .field("dependent_sequences", &self.dependent_sequences.len())
            .field("alerted", &self.alert.is_raised())
            .finish()
    }
}
