//! Event factories
//!
//! A factory populates the ring once at construction: it is called exactly
//! one time per slot, and the instances it returns are recycled in place for
//! the life of the ring.

/// Factory for preallocating ring slots
pub trait EventFactory<T>: Send + Sync {
    /// Create one event instance in its initial state
    fn new_instance(&self) -> T;
}

/// Factory for event types that implement `Default`
pub struct DefaultEventFactory<T: Default> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Default> DefaultEventFactory<T> {
    /// Create a new default event factory
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default + Send + Sync> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Factory backed by a closure
pub struct ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    factory_fn: F,
    _phantom: std::marker::PhantomData<T>,
}

impl<T, F> ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    /// Create a new closure-backed factory
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<T, F>
where
    T: Send + Sync,
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}
