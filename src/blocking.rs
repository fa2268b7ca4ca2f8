//! Blocking single-producer single-consumer FIFO.
//!
//! A [`RingBuffer`] behind a mutex. `write` waits for space and `read` waits
//! for data, releasing the lock while they sleep. Because a caller can sleep
//! indefinitely, this flavour belongs on threads that may block, not inside a
//! hard real-time callback.
//!
//! A wait can be broken from outside with [`set_error`](Producer::set_error):
//! the blocked call of that role wakes and returns the injected error. This is
//! how a pipeline shuts down a thread that is parked on an empty FIFO.

use std::sync::Arc;

use tracing::debug;

use crate::error::{FifoError, Result};
use crate::fifo::{Fifo, FifoReader, FifoWriter, Role, SplitFifo};
use crate::ring::RingBuffer;
use crate::sync::Gate;

struct State<T> {
    ring: RingBuffer<T>,
    /// Index 0 aborts the reader, index 1 the writer.
    errors: [Option<FifoError>; 2],
}

struct Shared<T> {
    gate: Gate<State<T>>,
    max_fill_count: usize,
}

impl<T> Shared<T> {
    fn set_error(&self, role: Role, error: FifoError) {
        debug!(?role, %error, "injecting error into blocking fifo");
        self.gate.lock().errors[role.index()] = Some(error);
        self.gate.wake_all();
    }
}

/// Constructor for the blocking FIFO flavour.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockingFifo;

impl BlockingFifo {
    /// Create a FIFO for up to `max_fill_count` elements.
    ///
    /// Returns the `(producer, consumer)` pair; move each to its thread.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T: Clone + Send>(
        max_fill_count: usize,
        fill: T,
    ) -> Result<(Producer<T>, Consumer<T>)> {
        let shared = Arc::new(Shared {
            gate: Gate::new(State {
                ring: RingBuffer::new(max_fill_count, fill)?,
                errors: [None, None],
            }),
            max_fill_count,
        });

        Ok((
            Producer {
                shared: Arc::clone(&shared),
            },
            Consumer { shared },
        ))
    }
}

impl<T: Clone + Send> SplitFifo<T> for BlockingFifo {
    type Writer = Producer<T>;
    type Reader = Consumer<T>;

    fn split(max_fill_count: usize, fill: T) -> Result<(Producer<T>, Consumer<T>)> {
        Self::new(max_fill_count, fill)
    }
}

/// Write end of a [`BlockingFifo`].
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// Read end of a [`BlockingFifo`].
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send> Producer<T> {
    /// Make blocked calls of `role` fail with `error`.
    ///
    /// Either handle can abort either role.
    pub fn set_error(&self, role: Role, error: FifoError) {
        self.shared.set_error(role, error);
    }
}

impl<T: Clone + Send> Consumer<T> {
    /// See [`Producer::set_error`].
    pub fn set_error(&self, role: Role, error: FifoError) {
        self.shared.set_error(role, error);
    }
}

impl<T: Clone + Send> FifoWriter<T> for Producer<T> {
    /// Write all of `data`, waiting for space if needed.
    ///
    /// Fails at once if `data` could never fit, and with the injected error
    /// if the writer role is aborted while it would have to wait.
    fn write(&mut self, data: &[T]) -> Result<()> {
        if data.len() > self.shared.max_fill_count {
            return Err(FifoError::Capacity {
                requested: data.len(),
                available: self.shared.max_fill_count,
            });
        }

        let gate = &self.shared.gate;
        let mut state = gate.lock();
        while state.ring.available_space() < data.len() {
            if let Some(error) = &state.errors[Role::Writer.index()] {
                return Err(error.clone());
            }
            state = gate.wait_for_decrease(state);
        }

        state.ring.write(data)?;
        gate.increment();
        Ok(())
    }

    fn available_space(&self) -> usize {
        self.shared.gate.lock().ring.available_space()
    }

    fn max_fill_count(&self) -> usize {
        self.shared.max_fill_count
    }

    fn set_error(&self, role: Role, error: FifoError) {
        self.shared.set_error(role, error);
    }
}

impl<T: Clone + Send> FifoReader<T> for Consumer<T> {
    /// Fill all of `out`, waiting for data if needed.
    fn read(&mut self, out: &mut [T]) -> Result<()> {
        if out.len() > self.shared.max_fill_count {
            return Err(FifoError::Underflow {
                requested: out.len(),
                available: self.shared.max_fill_count,
            });
        }

        let gate = &self.shared.gate;
        let mut state = gate.lock();
        while state.ring.fill_count() < out.len() {
            if let Some(error) = &state.errors[Role::Reader.index()] {
                return Err(error.clone());
            }
            state = gate.wait_for_increase(state);
        }

        state.ring.read(out)?;
        gate.decrement();
        Ok(())
    }

    fn fill_count(&self) -> usize {
        self.shared.gate.lock().ring.fill_count()
    }

    fn max_fill_count(&self) -> usize {
        self.shared.max_fill_count
    }

    fn set_error(&self, role: Role, error: FifoError) {
        self.shared.set_error(role, error);
    }
}
