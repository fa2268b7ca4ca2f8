//! Mutex and condition-variable plumbing for the blocking FIFO.
//!
//! Everything that blocks goes through [`Gate`], so the backend is chosen in
//! one place at build time: the standard library by default, `parking_lot`
//! with the `parking_lot` feature. Lock poisoning is not meaningful for FIFO
//! cursors, so the std backend recovers the guard instead of panicking.

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "parking_lot")]
pub(crate) use parking_lot::{Condvar, Mutex, MutexGuard};
#[cfg(not(feature = "parking_lot"))]
pub(crate) use std::sync::{Condvar, Mutex, MutexGuard};

#[cfg(not(feature = "parking_lot"))]
use std::sync::{PoisonError, TryLockError};

use crate::error::{FifoError, Result};

#[cfg(feature = "parking_lot")]
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
}

#[cfg(not(feature = "parking_lot"))]
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock without waiting. `None` if another thread holds the lock.
#[cfg(feature = "parking_lot")]
#[inline]
#[cfg_attr(not(feature = "cpal_sink"), allow(dead_code))]
pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    mutex.try_lock()
}

#[cfg(not(feature = "parking_lot"))]
#[inline]
#[cfg_attr(not(feature = "cpal_sink"), allow(dead_code))]
pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

#[cfg(feature = "parking_lot")]
#[inline]
fn wait<'a, T>(condvar: &Condvar, mut guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(&mut guard);
    guard
}

#[cfg(not(feature = "parking_lot"))]
#[inline]
fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// State `S` behind a mutex, with one condition variable per direction.
///
/// The producer waits for the fill level to *decrease* (space to appear) and
/// signals *increase* after writing; the consumer does the opposite. Waiting
/// releases the mutex and reacquires it before returning. Wakeups may be
/// spurious, so callers re-check their condition in a loop.
pub(crate) struct Gate<S> {
    state: Mutex<S>,
    increased: Condvar,
    decreased: Condvar,
}

impl<S> Gate<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            increased: Condvar::new(),
            decreased: Condvar::new(),
        }
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, S> {
        lock(&self.state)
    }

    /// Consumer side: wait until the producer calls [`Gate::increment`].
    #[inline]
    pub(crate) fn wait_for_increase<'a>(&self, guard: MutexGuard<'a, S>) -> MutexGuard<'a, S> {
        wait(&self.increased, guard)
    }

    /// Producer side: wait until the consumer calls [`Gate::decrement`].
    #[inline]
    pub(crate) fn wait_for_decrease<'a>(&self, guard: MutexGuard<'a, S>) -> MutexGuard<'a, S> {
        wait(&self.decreased, guard)
    }

    #[inline]
    pub(crate) fn increment(&self) {
        self.increased.notify_one();
    }

    #[inline]
    pub(crate) fn decrement(&self) {
        self.decreased.notify_one();
    }

    /// Wake whoever is waiting on either side.
    pub(crate) fn wake_all(&self) {
        self.increased.notify_all();
        self.decreased.notify_all();
    }
}

/// A pending error for one side of a double buffer.
///
/// Checking is a single atomic load until an error is actually raised, so the
/// real-time side pays nothing for it in normal operation.
#[derive(Default)]
pub(crate) struct ErrorSlot {
    raised: AtomicBool,
    error: Mutex<Option<FifoError>>,
}

impl ErrorSlot {
    pub(crate) fn raise(&self, error: FifoError) {
        *lock(&self.error) = Some(error);
        self.raised.store(true, Ordering::Release);
    }

    pub(crate) fn check(&self) -> Result<()> {
        if !self.raised.load(Ordering::Acquire) {
            return Ok(());
        }
        match lock(&self.error).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub(crate) fn get(&self) -> Option<FifoError> {
        if self.raised.load(Ordering::Acquire) {
            lock(&self.error).clone()
        } else {
            None
        }
    }
}
