//! CPAL output devices fed through a drift-compensating FIFO.
//!
//! This is the audio-driver end of a pipeline: the device callback is the
//! FIFO's reader, and whatever thread produces audio calls
//! [`DriftSink::write`]. Clock drift between the two shows up as xruns in the
//! FIFO instead of glitches in the stream setup.
//!
//! # Example: List and Select a Device
//!
//! ```no_run
//! use puffer::{CpalDevice, DriftConfig};
//!
//! for (i, device) in CpalDevice::list_outputs().iter().enumerate() {
//!     println!("[{}] {} ({} Hz, {} ch)",
//!         i, device.name(), device.sample_rate(), device.channels());
//! }
//!
//! let device = CpalDevice::default_output().unwrap();
//! let channels = device.channels() as usize;
//! let sink = device
//!     .create_drift_sink(DriftConfig::new(256 * channels, 1024 * channels, 4096 * channels))
//!     .unwrap();
//! sink.write(&vec![0.0; 512 * channels]).unwrap();
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use tracing::{debug, error};

use crate::drift::{DriftConfig, DriftFifo, XrunStats};
use crate::error::{FifoError, Result};
use crate::fifo::Fifo;
use crate::sync::{self, Mutex};

/// A discovered audio output device.
///
/// Use [`CpalDevice::default_output`] to get the system default, or
/// [`CpalDevice::list_outputs`] to enumerate all available devices.
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalDevice {
    /// Get the system's default output device.
    ///
    /// Returns `None` if no audio device is available.
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        Self::from_device(host.default_output_device()?)
    }

    /// List all available audio output devices.
    ///
    /// Returns an empty list if no devices are found or if enumeration fails.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(Self::from_device).collect())
            .unwrap_or_default()
    }

    fn from_device(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            name,
            device,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Open an output stream on this device, reading interleaved samples from
    /// a [`DriftFifo`] configured by `config`.
    ///
    /// Fill counts in `config` are in samples, not frames.
    pub fn create_drift_sink(&self, config: DriftConfig) -> Result<DriftSink> {
        let shared = Arc::new(SinkShared {
            fifo: Mutex::new(DriftFifo::new(config, 0.0)?),
            contended: AtomicUsize::new(0),
            running: AtomicBool::new(true),
        });

        let device = self.device.clone();
        let sample_format = self.config.sample_format();
        let stream_config = self.config.config();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        // cpal streams are not `Send` on every platform, so the stream is
        // built and dropped on its own thread.
        let stream_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("puffer-output".into())
            .spawn(move || {
                let stream = match start_stream(&device, sample_format, &stream_config, &stream_shared) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while stream_shared.running.load(Ordering::Acquire) {
                    thread::park();
                }
                drop(stream);
                debug!("output stream closed");
            })
            .map_err(|e| FifoError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(FifoError::Device(
                    "output thread exited before starting the stream".into(),
                ))
            }
        }

        debug!(device = %self.name, sample_rate = self.sample_rate, channels = self.channels, "output stream started");
        Ok(DriftSink {
            shared,
            thread: Some(thread),
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

struct SinkShared {
    fifo: Mutex<DriftFifo<f32>>,
    /// Callbacks that found the FIFO locked and played silence instead.
    contended: AtomicUsize,
    running: AtomicBool,
}

/// A running output stream and the FIFO that feeds it.
///
/// Dropping the sink stops the stream.
pub struct DriftSink {
    shared: Arc<SinkShared>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
}

impl DriftSink {
    /// Queue interleaved samples for playback.
    ///
    /// Never blocks on the device: if the FIFO is full the excess is dropped
    /// and counted as a writer xrun.
    pub fn write(&self, samples: &[f32]) -> Result<()> {
        sync::lock(&self.shared.fifo).write(samples)
    }

    pub fn xruns(&self) -> XrunStats {
        sync::lock(&self.shared.fifo).xruns()
    }

    /// Samples buffered, including pending startup silence.
    pub fn fill_count(&self) -> usize {
        sync::lock(&self.shared.fifo).fill_count()
    }

    pub fn contended_callbacks(&self) -> usize {
        self.shared.contended.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for DriftSink {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

fn start_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    shared: &Arc<SinkShared>,
) -> Result<cpal::Stream> {
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(device, stream_config, shared, |s| s),
        SampleFormat::I16 => build_stream::<i16>(device, stream_config, shared, |s| {
            (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
        }),
        SampleFormat::U16 => build_stream::<u16>(device, stream_config, shared, |s| {
            ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16
        }),
        other => {
            return Err(FifoError::Device(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| FifoError::Device(e.to_string()))?;

    stream.play().map_err(|e| FifoError::Device(e.to_string()))?;
    Ok(stream)
}

fn build_stream<S>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    shared: &Arc<SinkShared>,
    convert: fn(f32) -> S,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    S: cpal::SizedSample,
{
    let shared = Arc::clone(shared);
    let mut scratch = vec![0.0f32; scratch_len(stream_config)];
    device.build_output_stream(
        stream_config,
        move |data: &mut [S], _: &cpal::OutputCallbackInfo| {
            render(data, &mut scratch, &shared, convert);
        },
        |err| error!(%err, "output stream error"),
        None,
    )
}

/// Frames assumed per callback when the host picks the buffer size.
const DEFAULT_CALLBACK_FRAMES: usize = 8192;

/// Samples the callback can convert per FIFO read, sized before the stream
/// starts so the callback never allocates.
fn scratch_len(stream_config: &cpal::StreamConfig) -> usize {
    let frames = match stream_config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames as usize,
        cpal::BufferSize::Default => DEFAULT_CALLBACK_FRAMES,
    };
    (frames * stream_config.channels as usize).max(1)
}

/// Device callback body. Never waits for the producer and never allocates.
///
/// A host buffer larger than `scratch` is served in `scratch`-sized reads.
fn render<S: Copy>(data: &mut [S], scratch: &mut [f32], shared: &SinkShared, convert: fn(f32) -> S) {
    let Some(mut fifo) = sync::try_lock(&shared.fifo) else {
        shared.contended.fetch_add(1, Ordering::Relaxed);
        data.fill(convert(0.0));
        return;
    };

    for chunk in data.chunks_mut(scratch.len()) {
        let block = &mut scratch[..chunk.len()];
        if fifo.read(block).is_err() {
            block.fill(0.0);
        }
        for (out, &sample) in chunk.iter_mut().zip(block.iter()) {
            *out = convert(sample);
        }
    }
}
