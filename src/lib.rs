//! `slipstream` - Sequenced Ring-Buffer Event Exchange
//!
//! A bounded, preallocated ring of slots coordinated by monotonically
//! increasing sequence counters, for high-throughput, low-latency event
//! exchange between producer and consumer threads in the same process.
//!
//! ## Features
//!
//! - **Lock-free claim and publish**: producers coordinate through atomic
//!   sequence counters and per-slot availability markers
//! - **Zero allocation in steady state**: every slot is created once at
//!   construction and recycled in place as the ring wraps
//! - **False-sharing aware**: every shared counter owns its cache line
//! - **Pluggable waiting**: blocking, sleeping, yielding, and busy-spin
//!   strategies trade CPU for latency
//! - **Pipelined consumers**: sequence barriers express dependencies between
//!   consumer stages
//!
//! ## Quick Start
//!
//! ```rust
//! use slipstream::exchange::{BlockingWaitStrategy, DefaultEventFactory, RingBuffer};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct Tick {
//!     value: i64,
//! }
//!
//! let factory = DefaultEventFactory::<Tick>::new();
//! let ring = RingBuffer::create_single_producer(
//!     factory,
//!     1024, // must be a power of two
//!     Arc::new(BlockingWaitStrategy::new()),
//! )
//! .unwrap();
//!
//! // Claim, write, publish.
//! let sequence = ring.next();
//! // SAFETY: we hold the claim on `sequence` and have not published it yet.
//! unsafe { ring.get_preallocated(sequence).value = 42 };
//! ring.publish(sequence);
//!
//! assert_eq!(ring.get(sequence).value, 42);
//! ```
//!
//! ## Architecture
//!
//! - **`RingBuffer`**: owns the slot array and fronts the whole exchange
//! - **`Sequence`**: cache-line-isolated atomic counter, the only shared
//!   mutable primitive in the core
//! - **`Sequencer`**: the claim protocol (single- and multi-producer)
//! - **`SequenceBarrier`**: the consumer-side view combining cursor waits
//!   with upstream-dependency gating
//! - **`WaitStrategy`**: how a consumer idles until its target sequence
//! - **`BatchEventProcessor`**: a consumer driver that pulls contiguous
//!   batches from a barrier and dispatches to an [`EventHandler`]
//!
//! [`EventHandler`]: exchange::EventHandler

pub mod exchange;

pub use exchange::{
    is_power_of_two,
    AlertSignal,
    BatchEventProcessor,
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    ClosureEventFactory,
    ClosureEventHandler,
    ClosureEventTranslator,
    DefaultEventFactory,
    EventFactory,
    EventHandler,
    EventTranslator,
    EventTranslatorOneArg,
    EventTranslatorThreeArg,
    EventTranslatorTwoArg,
    ExchangeError,
    MultiProducerSequencer,
    ProcessingSequenceBarrier,
    ProducerType,
    Result,
    RingBuffer,
    Sequence,
    SequenceBarrier,
    SequenceGroup,
    Sequencer,
    SingleProducerSequencer,
    SleepingWaitStrategy,
    WaitStrategy,
    YieldingWaitStrategy,
    INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `slipstream` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
