//! Event translators
//!
//! A translator writes payload data into a claimed slot. The ring invokes it
//! exactly once per claimed sequence, between claim and publish, so the
//! translator always sees the preallocated instance left behind by the
//! previous lap.

/// Translate data into a claimed event slot
pub trait EventTranslator<T>: Send + Sync {
    /// Populate `event`, which is already allocated in the ring
    fn translate_to(&self, event: &mut T, sequence: i64);
}

/// Translator taking one argument
pub trait EventTranslatorOneArg<T, A>: Send + Sync {
    /// Populate `event` from `arg0`
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A);
}

/// Translator taking two arguments
pub trait EventTranslatorTwoArg<T, A, B>: Send + Sync {
    /// Populate `event` from `arg0` and `arg1`
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A, arg1: B);
}

/// Translator taking three arguments
pub trait EventTranslatorThreeArg<T, A, B, C>: Send + Sync {
    /// Populate `event` from `arg0`, `arg1` and `arg2`
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A, arg1: B, arg2: C);
}

/// Translator backed by a closure
pub struct ClosureEventTranslator<T, F>
where
    F: Fn(&mut T, i64) + Send + Sync,
{
    translator_fn: F,
    _phantom: std::marker::PhantomData<T>,
}

impl<T, F> ClosureEventTranslator<T, F>
where
    F: Fn(&mut T, i64) + Send + Sync,
{
    /// Create a new closure-backed translator
    pub fn new(translator_fn: F) -> Self {
        Self {
            translator_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventTranslator<T> for ClosureEventTranslator<T, F>
where
    T: Send + Sync,
    F: Fn(&mut T, i64) + Send + Sync,
{
    fn translate_to(&self, event: &mut T, sequence: i64) {
        (self.translator_fn)(event, sequence);
    }
}
