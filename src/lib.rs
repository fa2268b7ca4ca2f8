//! # puffer
//!
//! FIFOs for moving blocks of audio samples between threads that run at
//! different, independently timed rates.
//!
//! | Type | Threads | Blocks | Use |
//! |------|---------|--------|-----|
//! | [`RingBuffer`] | one | never | building block, or behind your own lock |
//! | [`LockFreeFifo`] | two | never | real-time producer or consumer |
//! | [`BlockingFifo`] | two | yes | worker threads that should sleep when idle |
//! | [`DriftFifo`] | one (or locked) | never | clocks that drift; drops and pads instead of failing |
//! | [`DoubleBuffer`] | two | per flavour | adapt an I/O block size to a processing block size |
//! | [`ConfigQueue`] | two | never | hand new settings to a real-time thread |
//!
//! Every cross-thread type is created as a pair of handles (like `rtrb`), one
//! per thread. Handles are `Send` but not `Sync`, so each side has exactly one
//! owner.
//!
//! ## Quick Start
//!
//! ```
//! use puffer::{DoubleBuffer, DoubleBufferConfig, BlockingFifo};
//!
//! // Audio callback delivers 4 frames, the processing thread wants 6.
//! let config = DoubleBufferConfig::new(4, 6, 4);
//! let (mut outer, mut inner) = DoubleBuffer::new::<BlockingFifo, _>(config, 0.0f32).unwrap();
//!
//! let worker = std::thread::spawn(move || {
//!     let mut block = [0.0; 6];
//!     while inner.input(&mut block).is_ok() {
//!         block.iter_mut().for_each(|s| *s *= 0.5);
//!         if inner.output(&block).is_err() {
//!             break;
//!         }
//!     }
//! });
//!
//! let mut out = [0.0; 4];
//! for _ in 0..12 {
//!     outer.process(&[1.0; 4], &mut out, 4).unwrap();
//! }
//! outer.provoke_inner_error(puffer::FifoError::aborted("shutdown"));
//! worker.join().unwrap();
//! ```
//!
//! ## Features
//!
//! - `cpal_sink`: [`CpalDevice`] and [`DriftSink`] for audio output
//! - `parking_lot`: use `parking_lot` locks in the blocking FIFO
//! - `serde`: derive `Serialize`/`Deserialize` for the config structs

pub mod blocking;
pub mod config_queue;
#[cfg(feature = "cpal_sink")]
pub mod device;
pub mod double_buffer;
pub mod drift;
pub mod error;
pub mod fifo;
pub mod lock_free;
pub mod ring;
mod sync;

pub use blocking::BlockingFifo;
pub use config_queue::{ConfigQueue, ConfigReader, ConfigWriter};
#[cfg(feature = "cpal_sink")]
pub use device::{CpalDevice, DriftSink};
pub use double_buffer::{DoubleBuffer, DoubleBufferConfig, Inner, Outer};
pub use drift::{DriftConfig, DriftFifo, SideXruns, XrunStats};
pub use error::{FifoError, Result};
pub use fifo::{Fifo, FifoReader, FifoWriter, Role, SplitFifo};
pub use lock_free::LockFreeFifo;
pub use ring::RingBuffer;
