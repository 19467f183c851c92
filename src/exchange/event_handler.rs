//! Event handlers
//!
//! The interface consumer drivers program against. A handler sees every
//! published event exactly once, in sequence order, on its driver's thread.

use crate::exchange::Result;

/// Consumer-side callback for processing published events
///
/// `end_of_batch` is true for the last event of the contiguous batch the
/// driver pulled from its barrier; handlers batching side effects (flushes,
/// syscalls) key off it.
pub trait EventHandler<T>: Send {
    /// Process one published event
    ///
    /// # Errors
    /// An error is reported by the driver and processing continues with the
    /// next event; the sequence is considered consumed either way.
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()>;

    /// Called once before the driver starts delivering events
    fn on_start(&mut self) {}

    /// Called once after the driver stops delivering events
    fn on_shutdown(&mut self) {}
}

/// Handler backed by a closure, for simple pipelines and tests
pub struct ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) + Send,
{
    handler_fn: F,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) + Send,
{
    /// Create a new closure-backed handler
    pub fn new(handler_fn: F) -> Self {
        Self {
            handler_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<T, F>
where
    T: Send + Sync,
    F: FnMut(&T, i64, bool) + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (self.handler_fn)(event, sequence, end_of_batch);
        Ok(())
    }
}
