//! Safe global-state helpers for process-wide singletons.
//!
//! The frame allocator, descriptor tables, interrupt table, and scheduler
//! are all process-wide singletons with an `uninit -> init -> running`
//! lifecycle (spec.md §9). [`GlobalState<T>`] models that lifecycle without
//! a heap allocator: the value lives inline behind a [`spin::Mutex`], not
//! behind a `Box`, so pre-init access is a `None` rather than undefined
//! behavior.

use spin::{Mutex, MutexGuard};

/// A `T` that starts uninitialized and is set exactly once.
pub struct GlobalState<T> {
    inner: Mutex<Option<T>>,
}

impl<T> GlobalState<T> {
    /// Create new uninitialized global state.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Initialize the global state. Returns the value back on the second
    /// and later calls instead of overwriting an already-running subsystem.
    pub fn init(&self, value: T) -> Result<(), T> {
        let mut lock = self.inner.lock();
        if lock.is_some() {
            Err(value)
        } else {
            *lock = Some(value);
            Ok(())
        }
    }

    /// True once `init` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Run `f` against the value, or return `None` if not yet initialized.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.lock().as_ref().map(f)
    }

    /// Run `f` against the value mutably, or return `None` if not yet
    /// initialized.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }

    /// Lock the underlying mutex directly.
    pub fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.inner.lock()
    }
}

impl<T> Default for GlobalState<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized() {
        let state: GlobalState<u32> = GlobalState::new();
        assert!(!state.is_initialized());
        assert_eq!(state.with(|v| *v), None);
    }

    #[test]
    fn init_then_running() {
        let state = GlobalState::new();
        assert_eq!(state.init(42u32), Ok(()));
        assert!(state.is_initialized());
        assert_eq!(state.with(|v| *v), Some(42));
    }

    #[test]
    fn second_init_rejected() {
        let state = GlobalState::new();
        assert_eq!(state.init(1u32), Ok(()));
        assert_eq!(state.init(2u32), Err(2));
        assert_eq!(state.with(|v| *v), Some(1));
    }

    #[test]
    fn with_mut_updates_in_place() {
        let state = GlobalState::new();
        state.init(10u32).unwrap();
        state.with_mut(|v| *v += 5);
        assert_eq!(state.with(|v| *v), Some(15));
    }
}
