//! Fixed-capacity ring buffer without any synchronization.
//!
//! This is the arithmetic every other FIFO builds on. Storage holds
//! `max_fill_count + 1` slots: one slot always stays unused so that a full
//! buffer (`write + 1 == read`) and an empty one (`write == read`) have
//! different cursor states.

use crate::error::{FifoError, Result};
use crate::fifo::Fifo;

/// Number of readable elements between two cursors.
///
/// Uses a conditional add instead of a modulo so it cannot underflow across
/// the wrap boundary.
#[inline]
pub(crate) fn fill_between(write: usize, read: usize, capacity: usize) -> usize {
    if write >= read {
        write - read
    } else {
        write + capacity - read
    }
}

/// Move a cursor forward by `count` slots, wrapping at `capacity`.
///
/// `count` never exceeds `capacity - 1`, so a single subtraction suffices.
#[inline]
pub(crate) fn advance(cursor: usize, count: usize, capacity: usize) -> usize {
    let next = cursor + count;
    if next >= capacity {
        next - capacity
    } else {
        next
    }
}

/// Allocate `max_fill_count + 1` copies of `fill`, reporting overflow and
/// allocation failure as [`FifoError::Construction`].
pub(crate) fn allocate<T: Clone>(max_fill_count: usize, fill: T) -> Result<Vec<T>> {
    let capacity = max_fill_count
        .checked_add(1)
        .ok_or(FifoError::Construction {
            max_fill_count,
            reason: "capacity overflows usize",
        })?;

    let mut storage = Vec::new();
    storage
        .try_reserve_exact(capacity)
        .map_err(|_| FifoError::Construction {
            max_fill_count,
            reason: "not enough memory",
        })?;
    storage.resize(capacity, fill);
    Ok(storage)
}

/// A single-threaded FIFO over a fixed slice of `T`.
///
/// Not thread-safe by itself. Use [`LockFreeFifo`](crate::LockFreeFifo) or
/// [`BlockingFifo`](crate::BlockingFifo) to cross threads.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    storage: Box<[T]>,
    write_cursor: usize,
    read_cursor: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a ring buffer that holds up to `max_fill_count` elements.
    ///
    /// All slots start out as copies of `fill`.
    pub fn new(max_fill_count: usize, fill: T) -> Result<Self> {
        Ok(Self {
            storage: allocate(max_fill_count, fill)?.into_boxed_slice(),
            write_cursor: 0,
            read_cursor: 0,
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.storage.len()
    }
}

impl<T: Clone> Fifo<T> for RingBuffer<T> {
    fn write(&mut self, data: &[T]) -> Result<()> {
        let available = self.available_space();
        if data.len() > available {
            return Err(FifoError::Capacity {
                requested: data.len(),
                available,
            });
        }

        let start = self.write_cursor;
        let first = data.len().min(self.capacity() - start);
        let (head, tail) = data.split_at(first);
        self.storage[start..start + first].clone_from_slice(head);
        self.storage[..tail.len()].clone_from_slice(tail);

        self.write_cursor = advance(start, data.len(), self.capacity());
        Ok(())
    }

    fn read(&mut self, out: &mut [T]) -> Result<()> {
        let available = self.fill_count();
        if out.len() > available {
            return Err(FifoError::Underflow {
                requested: out.len(),
                available,
            });
        }

        let start = self.read_cursor;
        let first = out.len().min(self.capacity() - start);
        let (head, tail) = out.split_at_mut(first);
        head.clone_from_slice(&self.storage[start..start + first]);
        let rest = tail.len();
        tail.clone_from_slice(&self.storage[..rest]);

        self.read_cursor = advance(start, out.len(), self.capacity());
        Ok(())
    }

    #[inline]
    fn fill_count(&self) -> usize {
        fill_between(self.write_cursor, self.read_cursor, self.capacity())
    }

    #[inline]
    fn available_space(&self) -> usize {
        self.max_fill_count() - self.fill_count()
    }

    #[inline]
    fn max_fill_count(&self) -> usize {
        self.capacity() - 1
    }

    fn clear(&mut self) {
        self.read_cursor = self.write_cursor;
    }
}
