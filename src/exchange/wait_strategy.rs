//! Wait strategies
//!
//! Wait strategies determine how a consumer idles until a target sequence
//! becomes available. Each one trades CPU for latency differently: blocking
//! parks on a condition variable, busy-spin burns a core for the lowest
//! possible wake-up cost.
//!
//! Every strategy polls the barrier's alert flag while waiting and propagates
//! [`ExchangeError::Alert`] within a bounded quantum, so a blocked consumer
//! can always be cancelled.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::exchange::{ExchangeError, Result, Sequence};

/// Cooperative cancellation flag polled by waiting consumers
///
/// Owned by a sequence barrier; raised by [`alert`](crate::exchange::SequenceBarrier::alert)
/// to unblock any strategy promptly.
#[derive(Debug, Default)]
pub struct AlertSignal {
    raised: std::sync::atomic::AtomicBool,
}

impl AlertSignal {
    /// Create a new, un-raised signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal
    pub fn raise(&self) {
        self.raised.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Clear the signal
    pub fn clear(&self) {
        self.raised.store(false, std::sync::atomic::Ordering::Release);
    }

    /// Check if the signal is raised
    pub fn is_raised(&self) -> bool {
        self.raised.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Fail with [`ExchangeError::Alert`] if the signal is raised
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(ExchangeError::Alert)
        } else {
            Ok(())
        }
    }
}

/// Strategy for waiting until a sequence becomes available
///
/// `wait_for` blocks until the dependent view of the ring (the cursor when
/// there are no dependent sequences, otherwise the minimum of the dependent
/// sequences) reaches `sequence`. It returns the highest value observed,
/// which may be larger than requested. For multi-producer rings the returned
/// value still needs the barrier's availability re-check; that is the
/// barrier's job, not the strategy's.
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait for `sequence` to become available
    ///
    /// # Errors
    /// Returns [`ExchangeError::Alert`] if `alert` is raised while waiting.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AlertSignal,
    ) -> Result<i64>;

    /// Signal all blocked consumers after the cursor has advanced
    fn signal_all_when_blocking(&self);
}

/// The view a consumer waits on: its upstream stages, or the cursor itself
/// when it is first in line.
#[inline]
fn dependent_value(cursor: &Sequence, dependent_sequences: &[Arc<Sequence>]) -> i64 {
    if dependent_sequences.is_empty() {
        cursor.get()
    } else {
        Sequence::minimum_sequence(dependent_sequences, i64::MAX)
    }
}

/// Blocking wait strategy using a mutex and condition variable
///
/// Lowest CPU use, highest wake-up latency. Producers signal after every
/// publish. Waits are bounded to a short quantum so an alert is seen even if
/// a signal is missed.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// Upper bound on how long a blocked consumer goes without re-checking the
/// alert flag.
const BLOCKING_QUANTUM: Duration = Duration::from_millis(1);

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AlertSignal,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                alert.check()?;
                self.condvar.wait_for(&mut guard, BLOCKING_QUANTUM);
            }
        }

        let mut available_sequence = dependent_value(cursor, dependent_sequences);
        while available_sequence < sequence {
            alert.check()?;
            std::hint::spin_loop();
            available_sequence = dependent_value(cursor, dependent_sequences);
        }

        Ok(available_sequence)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Sleeping wait strategy
///
/// Spins briefly, yields for a while, then sleeps in nanosecond quanta with
/// exponential back-off. A good default for consumers that must not burn a
/// core but should still wake quickly under load.
#[derive(Debug)]
pub struct SleepingWaitStrategy {
    retries: u32,
    min_sleep: Duration,
    max_sleep: Duration,
}

impl SleepingWaitStrategy {
    const DEFAULT_RETRIES: u32 = 200;
    const SPIN_THRESHOLD: u32 = 100;

    /// Create a new sleeping wait strategy with default pacing
    pub fn new() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            min_sleep: Duration::from_nanos(100),
            max_sleep: Duration::from_micros(100),
        }
    }

    /// Create a sleeping wait strategy with a custom sleep range
    pub fn with_sleep_range(min_sleep: Duration, max_sleep: Duration) -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            min_sleep,
            max_sleep: max_sleep.max(min_sleep),
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AlertSignal,
    ) -> Result<i64> {
        let mut counter = self.retries;
        let mut sleep = self.min_sleep;

        loop {
            let available_sequence = dependent_value(cursor, dependent_sequences);
            if available_sequence >= sequence {
                return Ok(available_sequence);
            }

            alert.check()?;

            if counter > Self::SPIN_THRESHOLD {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(sleep);
                sleep = (sleep * 2).min(self.max_sleep);
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        // Nothing parked on a condvar; sleepers re-check on their own.
    }
}

/// Yielding wait strategy
///
/// Spins briefly, then yields the rest of its timeslice on every iteration.
#[derive(Debug, Default)]
pub struct YieldingWaitStrategy;

impl YieldingWaitStrategy {
    const SPIN_TRIES: u32 = 100;

    /// Create a new yielding wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AlertSignal,
    ) -> Result<i64> {
        let mut counter = Self::SPIN_TRIES;

        loop {
            let available_sequence = dependent_value(cursor, dependent_sequences);
            if available_sequence >= sequence {
                return Ok(available_sequence);
            }

            alert.check()?;

            if counter > 0 {
                counter -= 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        // Never blocks.
    }
}

/// Busy-spin wait strategy
///
/// Tight spin, no yielding. Lowest latency, one dedicated core per consumer.
#[derive(Debug, Default)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Create a new busy-spin wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AlertSignal,
    ) -> Result<i64> {
        loop {
            let available_sequence = dependent_value(cursor, dependent_sequences);
            if available_sequence >= sequence {
                return Ok(available_sequence);
            }

            alert.check()?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        // Never blocks.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn strategies() -> Vec<Box<dyn WaitStrategy>> {
        vec![
            Box::new(BlockingWaitStrategy::new()),
            Box::new(SleepingWaitStrategy::new()),
            Box::new(YieldingWaitStrategy::new()),
            Box::new(BusySpinWaitStrategy::new()),
        ]
    }

    #[test]
    fn test_returns_immediately_when_available() {
        for strategy in strategies() {
            let cursor = Sequence::new(10);
            let alert = AlertSignal::new();

            let result = strategy.wait_for(5, &cursor, &[], &alert);
            assert_eq!(result.unwrap(), 10, "{strategy:?}");
        }
    }

    #[test]
    fn test_returns_dependent_minimum_when_gated() {
        for strategy in strategies() {
            let cursor = Sequence::new(20);
            let dependents = vec![Arc::new(Sequence::new(12)), Arc::new(Sequence::new(15))];
            let alert = AlertSignal::new();

            let result = strategy.wait_for(5, &cursor, &dependents, &alert);
            assert_eq!(result.unwrap(), 12, "{strategy:?}");
        }
    }

    #[test]
    fn test_wakes_when_cursor_advances() {
        for strategy in strategies() {
            let strategy: Arc<dyn WaitStrategy> = Arc::from(strategy);
            let cursor = Arc::new(Sequence::new(-1));
            let alert = Arc::new(AlertSignal::new());

            let waiter = {
                let strategy = Arc::clone(&strategy);
                let cursor = Arc::clone(&cursor);
                let alert = Arc::clone(&alert);
                thread::spawn(move || strategy.wait_for(0, &cursor, &[], &alert))
            };

            thread::sleep(Duration::from_millis(5));
            cursor.set(3);
            strategy.signal_all_when_blocking();

            assert_eq!(waiter.join().unwrap().unwrap(), 3);
        }
    }

    #[test]
    fn test_alert_unblocks_promptly() {
        for strategy in strategies() {
            let strategy: Arc<dyn WaitStrategy> = Arc::from(strategy);
            let cursor = Arc::new(Sequence::new(-1));
            let alert = Arc::new(AlertSignal::new());

            let waiter = {
                let strategy = Arc::clone(&strategy);
                let cursor = Arc::clone(&cursor);
                let alert = Arc::clone(&alert);
                thread::spawn(move || strategy.wait_for(1000, &cursor, &[], &alert))
            };

            thread::sleep(Duration::from_millis(5));
            let start = Instant::now();
            alert.raise();
            strategy.signal_all_when_blocking();

            let result = waiter.join().unwrap();
            assert!(matches!(result, Err(ExchangeError::Alert)));
            assert!(start.elapsed() < Duration::from_millis(100));
        }
    }

    #[test]
    fn test_alert_signal_flag_ops() {
        let alert = AlertSignal::new();
        assert!(!alert.is_raised());
        assert!(alert.check().is_ok());

        alert.raise();
        assert!(alert.is_raised());
        assert!(matches!(alert.check(), Err(ExchangeError::Alert)));

        alert.clear();
        assert!(alert.check().is_ok());
    }
}
