//! Lock-free single-producer single-consumer FIFO.
//!
//! The ring storage is shared between a [`Producer`] and a [`Consumer`]. Each
//! side owns its cursor as a plain index and publishes it through an atomic
//! mirror after touching the slots:
//!
//! - the producer copies data in, then release-stores the write cursor;
//! - the consumer acquire-loads that mirror before trusting the fill count.
//!
//! The read cursor travels the other way. A mirror can lag behind its owner,
//! which only ever makes the other side see less data (or less space) than
//! there really is, never more.
//!
//! ```
//! use puffer::{FifoReader, FifoWriter, LockFreeFifo};
//!
//! let (mut producer, mut consumer) = LockFreeFifo::new(256, 0.0f32).unwrap();
//!
//! let audio_thread = std::thread::spawn(move || {
//!     producer.write(&[0.1; 64]).unwrap();
//! });
//! audio_thread.join().unwrap();
//!
//! let mut block = [0.0; 64];
//! assert_eq!(consumer.fill_count(), 64);
//! consumer.read(&mut block).unwrap();
//! ```

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{FifoError, Result};
use crate::fifo::{FifoReader, FifoWriter, SplitFifo};
use crate::ring::{advance, allocate, fill_between};

/// Atomic copy of one cursor, on its own cache line.
#[repr(align(64))]
struct Mirror(AtomicUsize);

struct Shared<T> {
    /// Written only by the producer.
    write_mirror: Mirror,
    /// Written only by the consumer.
    read_mirror: Mirror,
    slots: Box<[UnsafeCell<T>]>,
}

// SAFETY: a slot is only ever touched by one side at a time. The producer
// writes slots in `[write, read - 1)` and the consumer reads slots in
// `[read, write)`; the two ranges never overlap because each side computes
// its range from the other side's acquire-loaded mirror, which can only lag.
unsafe impl<T: Send> Sync for Shared<T> {}

/// Marker type to opt out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Constructor for the lock-free FIFO flavour.
///
/// Use [`LockFreeFifo::new`] directly, or pass `LockFreeFifo` as the flavour
/// parameter of [`DoubleBuffer::new`](crate::DoubleBuffer::new).
#[derive(Clone, Copy, Debug, Default)]
pub struct LockFreeFifo;

impl LockFreeFifo {
    /// Create a FIFO for up to `max_fill_count` elements.
    ///
    /// Returns the `(producer, consumer)` pair; move each to its thread.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T: Clone + Send>(
        max_fill_count: usize,
        fill: T,
    ) -> Result<(Producer<T>, Consumer<T>)> {
        let slots = allocate(max_fill_count, fill)?
            .into_iter()
            .map(UnsafeCell::new)
            .collect();

        let shared = Arc::new(Shared {
            write_mirror: Mirror(AtomicUsize::new(0)),
            read_mirror: Mirror(AtomicUsize::new(0)),
            slots,
        });

        let producer = Producer {
            shared: Arc::clone(&shared),
            write_cursor: 0,
            _unsync: PhantomData,
        };
        let consumer = Consumer {
            shared,
            read_cursor: 0,
            _unsync: PhantomData,
        };
        Ok((producer, consumer))
    }
}

impl<T: Clone + Send> SplitFifo<T> for LockFreeFifo {
    type Writer = Producer<T>;
    type Reader = Consumer<T>;

    fn split(max_fill_count: usize, fill: T) -> Result<(Producer<T>, Consumer<T>)> {
        Self::new(max_fill_count, fill)
    }
}

/// Write end of a [`LockFreeFifo`].
///
/// `Send` but not `Sync`: it can move to the producer thread, but two threads
/// can never write through the same handle.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    write_cursor: usize,
    _unsync: PhantomUnsync,
}

/// Read end of a [`LockFreeFifo`].
///
/// Same threading rules as [`Producer`].
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    read_cursor: usize,
    _unsync: PhantomUnsync,
}

impl<T: Clone + Send> FifoWriter<T> for Producer<T> {
    fn write(&mut self, data: &[T]) -> Result<()> {
        let available = self.available_space();
        if data.len() > available {
            return Err(FifoError::Capacity {
                requested: data.len(),
                available,
            });
        }

        let capacity = self.shared.slots.len();
        let mut cursor = self.write_cursor;
        for value in data {
            // SAFETY: `cursor` lies in the free region computed above. The
            // consumer does not read it until the mirror store below
            // publishes it, and it has already released every slot in this
            // region (that is what the acquire-load of `read_mirror` saw).
            unsafe {
                *self.shared.slots[cursor].get() = value.clone();
            }
            cursor = advance(cursor, 1, capacity);
        }

        self.write_cursor = cursor;
        // Pairs with the acquire-load in `Consumer::fill_count`.
        self.shared.write_mirror.0.store(cursor, Ordering::Release);
        Ok(())
    }

    #[inline]
    fn available_space(&self) -> usize {
        let read = self.shared.read_mirror.0.load(Ordering::Acquire);
        self.max_fill_count() - fill_between(self.write_cursor, read, self.shared.slots.len())
    }

    #[inline]
    fn max_fill_count(&self) -> usize {
        self.shared.slots.len() - 1
    }
}

impl<T: Clone + Send> FifoReader<T> for Consumer<T> {
    fn read(&mut self, out: &mut [T]) -> Result<()> {
        let available = self.fill_count();
        if out.len() > available {
            return Err(FifoError::Underflow {
                requested: out.len(),
                available,
            });
        }

        let capacity = self.shared.slots.len();
        let mut cursor = self.read_cursor;
        for value in out.iter_mut() {
            // SAFETY: `cursor` lies in the published region: the acquire-load
            // of `write_mirror` in `fill_count` happened after the producer
            // finished writing it, and the producer will not touch it again
            // until our release-store below hands it back.
            unsafe {
                value.clone_from(&*self.shared.slots[cursor].get());
            }
            cursor = advance(cursor, 1, capacity);
        }

        self.read_cursor = cursor;
        // Pairs with the acquire-load in `Producer::available_space`.
        self.shared.read_mirror.0.store(cursor, Ordering::Release);
        Ok(())
    }

    #[inline]
    fn fill_count(&self) -> usize {
        let write = self.shared.write_mirror.0.load(Ordering::Acquire);
        fill_between(write, self.read_cursor, self.shared.slots.len())
    }

    #[inline]
    fn max_fill_count(&self) -> usize {
        self.shared.slots.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_see_each_others_progress() {
        let (mut producer, mut consumer) = LockFreeFifo::new(8, 0u32).unwrap();
        assert_eq!(producer.available_space(), 8);
        assert_eq!(consumer.fill_count(), 0);

        producer.write(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(consumer.fill_count(), 5);
        assert_eq!(producer.available_space(), 3);

        let mut out = [0u32; 4];
        consumer.read(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(producer.available_space(), 7);
    }

    #[test]
    fn wraps_and_keeps_order() {
        let (mut producer, mut consumer) = LockFreeFifo::new(5, 0i64).unwrap();
        let mut sent = 0i64;
        let mut received = Vec::new();

        for round in 0..40 {
            let len = 1 + round % 5;
            let block: Vec<i64> = (sent..sent + len as i64).collect();
            producer.write(&block).unwrap();
            sent += len as i64;

            let mut out = vec![0; consumer.fill_count()];
            consumer.read(&mut out).unwrap();
            received.extend(out);

            assert_eq!(
                producer.available_space() + consumer.fill_count(),
                producer.max_fill_count()
            );
        }

        assert_eq!(received, (0..sent).collect::<Vec<_>>());
    }

    #[test]
    fn refuses_writes_beyond_published_space() {
        let (mut producer, mut consumer) = LockFreeFifo::new(3, 'x').unwrap();
        producer.write(&['a', 'b']).unwrap();

        let err = producer.write(&['c', 'd']).unwrap_err();
        assert_eq!(err, FifoError::Capacity { requested: 2, available: 1 });

        let mut out = ['-'; 3];
        let err = consumer.read(&mut out).unwrap_err();
        assert_eq!(err, FifoError::Underflow { requested: 3, available: 2 });
    }

    #[test]
    fn split_matches_new() {
        let (mut producer, consumer) =
            <LockFreeFifo as SplitFifo<u8>>::split(2, 0).unwrap();
        producer.write(&[7, 7]).unwrap();
        assert_eq!(consumer.fill_count(), 2);
        assert_eq!(consumer.max_fill_count(), 2);
    }
}
