//! Sequenced ring-buffer event exchange
//!
//! This module provides the coordination engine: a preallocated ring of slots,
//! sequence counters for claim and publication, pluggable wait strategies for
//! consumers, and barriers for expressing dependencies between consumer
//! stages.

pub mod event_factory;
pub mod event_handler;
pub mod event_processor;
pub mod event_translator;
pub(crate) mod internal_log;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod wait_strategy;

#[cfg(test)]
mod property_tests;

pub use event_factory::{ClosureEventFactory, DefaultEventFactory, EventFactory};
pub use event_handler::{ClosureEventHandler, EventHandler};
pub use event_processor::BatchEventProcessor;
pub use event_translator::{
    ClosureEventTranslator, EventTranslator, EventTranslatorOneArg, EventTranslatorThreeArg,
    EventTranslatorTwoArg,
};
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::{Sequence, SequenceGroup};
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use wait_strategy::{
    AlertSignal, BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy,
    YieldingWaitStrategy,
};

/// The initial value of every sequence: nothing claimed, nothing published.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors that can occur in the exchange
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The ring cannot hold the requested claim without lapping a consumer.
    #[error("insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// Buffer sizes must be powers of two so slot lookup stays a masked index.
    #[error("buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    /// A blocked consumer was alerted; it must re-check its lifecycle.
    #[error("sequence barrier alerted")]
    Alert,

    /// Caller misuse surfaced as-is, never recovered internally.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// A user translator failed. The claimed sequence was still published so
    /// consumers waiting on it can make progress.
    #[error("event translator failed; sequence was published anyway")]
    TranslatorFault,
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}
