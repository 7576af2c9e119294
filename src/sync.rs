use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};

/// Non-poisoning mutex.
///
/// A panicking sink or producer must not wedge every other bucket, so a
/// poisoned lock is simply taken over.
pub(crate) struct Mutex<T: ?Sized> {
    std: StdMutex<T>,
}

impl<T> Mutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Mutex {
            std: StdMutex::new(value),
        }
    }

    pub(crate) fn into_inner(self) -> T {
        self.std.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ?Sized> Mutex<T> {
    pub(crate) fn lock(&self) -> MutexGuard<T> {
        self.std.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
