//! Capability traits shared by the FIFO flavours.

use crate::error::Result;

/// Which side of a FIFO a call belongs to.
///
/// The discriminant doubles as the index into a blocking FIFO's error box:
/// `0` aborts the reader, `1` aborts the writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Reader = 0,
    Writer = 1,
}

impl Role {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// A FIFO owned by a single thread.
///
/// Implemented by [`RingBuffer`](crate::RingBuffer), which has no
/// synchronization of its own, and [`DriftFifo`](crate::DriftFifo), which
/// layers xrun compensation on top of it. Both can be shared across threads
/// only behind a lock.
///
/// ```
/// use puffer::{Fifo, RingBuffer};
///
/// let mut fifo = RingBuffer::new(4, 0.0f32).unwrap();
/// fifo.write(&[0.5, 0.25]).unwrap();
///
/// let mut out = [0.0; 2];
/// fifo.read(&mut out).unwrap();
/// assert_eq!(out, [0.5, 0.25]);
/// assert_eq!(fifo.fill_count() + fifo.available_space(), fifo.max_fill_count());
/// ```
pub trait Fifo<T> {
    /// Copy all of `data` into the FIFO.
    fn write(&mut self, data: &[T]) -> Result<()>;

    /// Fill all of `out` from the FIFO.
    fn read(&mut self, out: &mut [T]) -> Result<()>;

    /// Number of elements that can be read right now.
    fn fill_count(&self) -> usize;

    /// Number of elements that can be written right now.
    fn available_space(&self) -> usize;

    /// The most elements the FIFO can hold at once.
    fn max_fill_count(&self) -> usize;

    /// Drop everything currently stored.
    fn clear(&mut self);
}

/// The producer half of a FIFO shared between two threads.
pub trait FifoWriter<T>: Send {
    /// Copy all of `data` into the FIFO.
    fn write(&mut self, data: &[T]) -> Result<()>;

    /// Space the writer can currently rely on. May undercount, never overcounts.
    fn available_space(&self) -> usize;

    /// The most elements the FIFO can hold at once.
    fn max_fill_count(&self) -> usize;

    /// Make calls of `role` that are blocked (or would block) fail with `error`.
    ///
    /// Flavours that never block ignore this.
    fn set_error(&self, role: Role, error: crate::FifoError) {
        let _ = (role, error);
    }
}

/// The consumer half of a FIFO shared between two threads.
pub trait FifoReader<T>: Send {
    /// Fill all of `out` from the FIFO.
    fn read(&mut self, out: &mut [T]) -> Result<()>;

    /// Data the reader can currently rely on. May undercount, never overcounts.
    fn fill_count(&self) -> usize;

    /// The most elements the FIFO can hold at once.
    fn max_fill_count(&self) -> usize;

    /// See [`FifoWriter::set_error`].
    fn set_error(&self, role: Role, error: crate::FifoError) {
        let _ = (role, error);
    }
}

/// A FIFO flavour that is created as a `(writer, reader)` pair.
///
/// This is what [`DoubleBuffer`](crate::DoubleBuffer) is generic over, so the
/// same block-size adaptation runs on top of either the lock-free or the
/// blocking FIFO.
pub trait SplitFifo<T> {
    type Writer: FifoWriter<T>;
    type Reader: FifoReader<T>;

    /// Create a FIFO holding up to `max_fill_count` elements, with every slot
    /// initialised to a copy of `fill`.
    fn split(max_fill_count: usize, fill: T) -> Result<(Self::Writer, Self::Reader)>;
}
