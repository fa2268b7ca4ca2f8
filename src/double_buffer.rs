//! Block-size adaptation between an outer and an inner process.
//!
//! The *outer* side sits at the I/O boundary (an audio callback delivering
//! `outer_size` frames at a time). The *inner* side runs the processing at its
//! own block size `inner_size`. Two FIFOs connect them:
//!
//! ```text
//!            input fifo (outer -> inner)
//!   Outer ---------------------------------> Inner
//!   process()                                input()
//!            output fifo (inner -> outer)     |
//!   Outer <--------------------------------- output()
//! ```
//!
//! The output FIFO starts out holding `delay` frames of the delay value, so the
//! round trip adds exactly `delay` frames of latency. Samples are interleaved;
//! input and output may have different channel counts.
//!
//! The delay must satisfy `delay >= inner_size - gcd(inner_size, outer_size)`
//! (see [`DoubleBufferConfig::minimum_delay`]). With less, the blocking flavour
//! can stall and the lock-free flavour reports underflows. This is not checked.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::error::{FifoError, Result};
use crate::fifo::{FifoReader, FifoWriter, Role, SplitFifo};
use crate::sync::ErrorSlot;

/// Block sizes, delay and channel counts of a double buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DoubleBufferConfig {
    /// Largest block the outer side passes to `process`, in frames.
    pub outer_size: usize,
    /// Block size of the inner side, in frames.
    pub inner_size: usize,
    /// Round-trip delay, in frames.
    pub delay: usize,
    pub input_channels: usize,
    pub output_channels: usize,
}

impl DoubleBufferConfig {
    /// Mono in, mono out.
    pub fn new(outer_size: usize, inner_size: usize, delay: usize) -> Self {
        Self {
            outer_size,
            inner_size,
            delay,
            input_channels: 1,
            output_channels: 1,
        }
    }

    /// Set the input and output channel counts.
    pub fn with_channels(mut self, input_channels: usize, output_channels: usize) -> Self {
        self.input_channels = input_channels;
        self.output_channels = output_channels;
        self
    }

    /// Smallest delay that keeps the two sides from stalling each other.
    ///
    /// Zero when either block size is zero; such a config is rejected by
    /// [`DoubleBuffer::new`] anyway.
    pub fn minimum_delay(&self) -> usize {
        self.inner_size
            .saturating_sub(gcd(self.inner_size, self.outer_size))
    }

    /// Frames each FIFO can hold.
    pub fn fifo_size(&self) -> usize {
        self.outer_size + self.inner_size + self.delay
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("outer block size", self.outer_size),
            ("inner block size", self.inner_size),
            ("input channel count", self.input_channels),
            ("output channel count", self.output_channels),
        ];
        for (what, value) in fields {
            if value == 0 {
                return Err(FifoError::Argument { what, value, limit: 1 });
            }
        }
        Ok(())
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn samples(frames: usize, channels: usize, max_fill_count: usize) -> Result<usize> {
    frames
        .checked_mul(channels)
        .ok_or(FifoError::Construction {
            max_fill_count,
            reason: "sample count overflows usize",
        })
}

struct Shared {
    config: DoubleBufferConfig,
    /// Raised by the outer side, surfaced on the inner side.
    inner_error: ErrorSlot,
    /// Raised by the inner side, surfaced on the outer side.
    outer_error: ErrorSlot,
}

/// Constructor for a connected [`Outer`] / [`Inner`] pair.
///
/// ```
/// use puffer::{DoubleBuffer, DoubleBufferConfig, LockFreeFifo};
///
/// // 4-frame I/O blocks, 6-frame processing blocks.
/// let config = DoubleBufferConfig::new(4, 6, 10);
/// let (mut outer, mut inner) = DoubleBuffer::new::<LockFreeFifo, _>(config, 0.0f32).unwrap();
///
/// let mut block = [0.0; 6];
/// let mut out = [1.0; 4];
/// for _ in 0..3 {
///     outer.process(&[0.5; 4], &mut out, 4).unwrap();
///     while inner.input_fifo_fill_count() >= 6 {
///         inner.input(&mut block).unwrap();
///         inner.output(&block).unwrap();
///     }
/// }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct DoubleBuffer;

impl DoubleBuffer {
    /// Create both halves of a double buffer over the FIFO flavour `F`.
    ///
    /// The output FIFO is pre-filled with `delay` frames of `delay_data`.
    pub fn new<F, T>(config: DoubleBufferConfig, delay_data: T) -> Result<(Outer<T, F>, Inner<T, F>)>
    where
        F: SplitFifo<T>,
        T: Clone,
    {
        config.validate()?;

        let frames = config
            .outer_size
            .checked_add(config.inner_size)
            .and_then(|n| n.checked_add(config.delay))
            .ok_or(FifoError::Construction {
                max_fill_count: usize::MAX,
                reason: "fifo size overflows usize",
            })?;
        let input_size = samples(frames, config.input_channels, frames)?;
        let output_size = samples(frames, config.output_channels, frames)?;
        let prefill = samples(config.delay, config.output_channels, output_size)?;

        let (input_writer, input_reader) = F::split(input_size, delay_data.clone())?;
        let (mut output_writer, output_reader) = F::split(output_size, delay_data.clone())?;
        output_writer.write(&vec![delay_data; prefill])?;

        let shared = Arc::new(Shared {
            config,
            inner_error: ErrorSlot::default(),
            outer_error: ErrorSlot::default(),
        });

        let outer = Outer {
            input: input_writer,
            output: output_reader,
            shared: Arc::clone(&shared),
            _marker: PhantomData,
        };
        let inner = Inner {
            input: input_reader,
            output: output_writer,
            shared,
            _marker: PhantomData,
        };
        Ok((outer, inner))
    }
}

/// The I/O side of a double buffer.
pub struct Outer<T, F: SplitFifo<T>> {
    input: F::Writer,
    output: F::Reader,
    shared: Arc<Shared>,
    _marker: PhantomData<fn(T)>,
}

/// The processing side of a double buffer.
pub struct Inner<T, F: SplitFifo<T>> {
    input: F::Reader,
    output: F::Writer,
    shared: Arc<Shared>,
    _marker: PhantomData<fn(T)>,
}

impl<T, F: SplitFifo<T>> Outer<T, F> {
    /// Hand `count` frames of input to the inner side and take back `count`
    /// frames of output.
    ///
    /// Fails if `count` exceeds the outer block size, if a slice is shorter
    /// than `count` frames, if the inner side provoked an error, or if the
    /// underlying FIFO fails.
    pub fn process(&mut self, input: &[T], output: &mut [T], count: usize) -> Result<()> {
        let config = &self.shared.config;
        if count > config.outer_size {
            return Err(FifoError::Argument {
                what: "block size",
                value: count,
                limit: config.outer_size,
            });
        }

        let input_len = count * config.input_channels;
        let output_len = count * config.output_channels;
        if input.len() < input_len {
            return Err(FifoError::Argument {
                what: "input signal length",
                value: input.len(),
                limit: input_len,
            });
        }
        if output.len() < output_len {
            return Err(FifoError::Argument {
                what: "output signal length",
                value: output.len(),
                limit: output_len,
            });
        }

        self.shared.outer_error.check()?;
        self.input.write(&input[..input_len])?;
        self.output.read(&mut output[..output_len])
    }

    /// Make the inner side fail with `error`, including a call that is
    /// currently blocked.
    pub fn provoke_inner_error(&self, error: FifoError) {
        debug!(%error, "provoking error on inner side of double buffer");
        self.shared.inner_error.raise(error.clone());
        self.input.set_error(Role::Reader, error.clone());
        self.output.set_error(Role::Writer, error);
    }

    /// Error provoked by the inner side, if any.
    pub fn outer_error(&self) -> Option<FifoError> {
        self.shared.outer_error.get()
    }

    pub fn config(&self) -> &DoubleBufferConfig {
        &self.shared.config
    }

    /// Frames the outer side can write right now.
    pub fn input_fifo_space(&self) -> usize {
        self.input.available_space() / self.shared.config.input_channels
    }

    /// Frames waiting for the outer side.
    pub fn output_fifo_fill_count(&self) -> usize {
        self.output.fill_count() / self.shared.config.output_channels
    }
}

impl<T, F: SplitFifo<T>> Inner<T, F> {
    /// Receive exactly `inner_size` frames of input.
    pub fn input(&mut self, signal: &mut [T]) -> Result<()> {
        let config = &self.shared.config;
        let len = config.inner_size * config.input_channels;
        if signal.len() < len {
            return Err(FifoError::Argument {
                what: "input signal length",
                value: signal.len(),
                limit: len,
            });
        }

        self.shared.inner_error.check()?;
        self.input.read(&mut signal[..len])
    }

    /// Deliver exactly `inner_size` frames of output.
    pub fn output(&mut self, signal: &[T]) -> Result<()> {
        let config = &self.shared.config;
        let len = config.inner_size * config.output_channels;
        if signal.len() < len {
            return Err(FifoError::Argument {
                what: "output signal length",
                value: signal.len(),
                limit: len,
            });
        }

        self.output.write(&signal[..len])
    }

    /// Make the outer side fail with `error`, including a call that is
    /// currently blocked.
    pub fn provoke_outer_error(&self, error: FifoError) {
        debug!(%error, "provoking error on outer side of double buffer");
        self.shared.outer_error.raise(error.clone());
        self.input.set_error(Role::Writer, error.clone());
        self.output.set_error(Role::Reader, error);
    }

    /// Error provoked by the outer side, if any.
    pub fn inner_error(&self) -> Option<FifoError> {
        self.shared.inner_error.get()
    }

    pub fn config(&self) -> &DoubleBufferConfig {
        &self.shared.config
    }

    /// Frames ready for the inner side.
    pub fn input_fifo_fill_count(&self) -> usize {
        self.input.fill_count() / self.shared.config.input_channels
    }

    /// Frames the inner side can write right now.
    pub fn output_fifo_space(&self) -> usize {
        self.output.available_space() / self.shared.config.output_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LockFreeFifo;

    type Pair = (Outer<i32, LockFreeFifo>, Inner<i32, LockFreeFifo>);

    fn pair(config: DoubleBufferConfig) -> Pair {
        DoubleBuffer::new::<LockFreeFifo, _>(config, -1).unwrap()
    }

    /// Run the inner side for as many whole blocks as are waiting.
    fn drain(inner: &mut Inner<i32, LockFreeFifo>) {
        let size = inner.config().inner_size;
        let mut block = vec![0; size];
        while inner.input_fifo_fill_count() >= size {
            inner.input(&mut block).unwrap();
            inner.output(&block).unwrap();
        }
    }

    #[test]
    fn minimum_delay_uses_gcd() {
        assert_eq!(DoubleBufferConfig::new(4, 6, 0).minimum_delay(), 4);
        assert_eq!(DoubleBufferConfig::new(64, 64, 0).minimum_delay(), 0);
        assert_eq!(DoubleBufferConfig::new(3, 5, 0).minimum_delay(), 4);
    }

    #[test]
    fn minimum_delay_of_unvalidated_config_does_not_underflow() {
        assert_eq!(DoubleBufferConfig::new(4, 0, 0).minimum_delay(), 0);
        assert_eq!(DoubleBufferConfig::new(0, 6, 0).minimum_delay(), 0);
        assert_eq!(DoubleBufferConfig::new(0, 0, 0).minimum_delay(), 0);
    }

    #[test]
    fn output_is_input_delayed() {
        let (mut outer, mut inner) = pair(DoubleBufferConfig::new(4, 6, 10));
        assert_eq!(outer.output_fifo_fill_count(), 10);
        assert_eq!(outer.config().fifo_size(), 20);

        let mut received = Vec::new();
        for block in 0..30 {
            let input: Vec<i32> = (block * 4..block * 4 + 4).collect();
            let mut output = [0; 4];
            outer.process(&input, &mut output, 4).unwrap();
            received.extend_from_slice(&output);
            drain(&mut inner);
        }

        for (n, &sample) in received.iter().enumerate() {
            let expected = if n < 10 { -1 } else { n as i32 - 10 };
            assert_eq!(sample, expected, "sample {}", n);
        }
    }

    #[test]
    fn channel_counts_scale_block_lengths() {
        let config = DoubleBufferConfig::new(2, 2, 2).with_channels(2, 1);
        let (mut outer, mut inner) = pair(config);

        let mut output = [0; 2];
        outer.process(&[1, 10, 2, 20], &mut output, 2).unwrap();
        assert_eq!(output, [-1, -1]);
        assert_eq!(inner.input_fifo_fill_count(), 2);

        // Inner side mixes the stereo input down to mono.
        let mut stereo = [0; 4];
        inner.input(&mut stereo).unwrap();
        let mono: Vec<i32> = stereo.chunks(2).map(|frame| frame[0] + frame[1]).collect();
        inner.output(&mono).unwrap();

        outer.process(&[0; 4], &mut output, 2).unwrap();
        assert_eq!(output, [11, 22]);
    }

    #[test]
    fn short_blocks_are_allowed() {
        let (mut outer, _inner) = pair(DoubleBufferConfig::new(4, 4, 4));
        let mut output = [0; 4];
        outer.process(&[1, 2], &mut output, 2).unwrap();
        assert_eq!(&output[..2], &[-1, -1]);
        assert_eq!(outer.output_fifo_fill_count(), 2);
    }

    #[test]
    fn rejects_bad_arguments() {
        let (mut outer, mut inner) = pair(DoubleBufferConfig::new(4, 6, 4));
        let mut output = [0; 8];

        let err = outer.process(&[0; 8], &mut output, 5).unwrap_err();
        assert_eq!(err, FifoError::Argument { what: "block size", value: 5, limit: 4 });

        let err = outer.process(&[0; 2], &mut output, 3).unwrap_err();
        assert!(matches!(err, FifoError::Argument { what: "input signal length", .. }));

        let err = inner.input(&mut [0; 5]).unwrap_err();
        assert!(matches!(err, FifoError::Argument { what: "input signal length", .. }));

        let err = DoubleBuffer::new::<LockFreeFifo, _>(DoubleBufferConfig::new(4, 0, 4), 0)
            .err()
            .unwrap();
        assert!(matches!(err, FifoError::Argument { what: "inner block size", .. }));
    }

    #[test]
    fn provoked_errors_surface_on_the_other_side() {
        let (mut outer, mut inner) = pair(DoubleBufferConfig::new(4, 4, 4));

        inner.provoke_outer_error(FifoError::aborted("dsp failed"));
        let mut output = [0; 4];
        assert_eq!(
            outer.process(&[0; 4], &mut output, 4),
            Err(FifoError::aborted("dsp failed"))
        );
        assert_eq!(outer.outer_error(), Some(FifoError::aborted("dsp failed")));

        assert_eq!(inner.inner_error(), None);
        outer.provoke_inner_error(FifoError::aborted("shutdown"));
        assert_eq!(
            inner.input(&mut [0; 4]),
            Err(FifoError::aborted("shutdown"))
        );
    }
}
