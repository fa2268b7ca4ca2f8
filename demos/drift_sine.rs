//! Play a sine wave through a drift-compensating FIFO
//!
//! Run with: cargo run --example drift_sine --features cpal_sink
//!
//! Lists available devices and lets you pick one, then plays a 440Hz sine
//! generated on the main thread. The generator paces itself with a wall clock,
//! so its rate drifts against the device clock; the FIFO absorbs that.

use std::io::{self, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};

use puffer::{CpalDevice, DriftConfig};

const BLOCK_FRAMES: usize = 64;

fn main() {
    tracing_subscriber::fmt::init();

    let devices = CpalDevice::list_outputs();
    if devices.is_empty() {
        eprintln!("No audio output devices found!");
        return;
    }

    println!("Available audio output devices:");
    for (i, device) in devices.iter().enumerate() {
        println!(
            "  [{}] {} ({}Hz, {} ch)",
            i,
            device.name(),
            device.sample_rate(),
            device.channels()
        );
    }

    print!("\nSelect device [0]: ");
    io::stdout().flush().unwrap();

    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    let choice: usize = input.trim().parse().unwrap_or(0);

    let device = devices.into_iter().nth(choice).unwrap_or_else(|| {
        println!("Invalid choice, using default device");
        CpalDevice::default_output().expect("No default device")
    });

    let channels = device.channels() as usize;
    let sample_rate = device.sample_rate();
    println!("\nUsing: {} @ {}Hz", device.name(), sample_rate);

    // Fill levels in samples: keep ~20ms queued, never less than ~5ms.
    let frames_per_ms = sample_rate as usize / 1000;
    let config = DriftConfig::new(
        5 * frames_per_ms * channels,
        20 * frames_per_ms * channels,
        100 * frames_per_ms * channels,
    );
    let sink = device.create_drift_sink(config).expect("Failed to open output stream");

    println!("Playing 440Hz sine wave...");
    println!("Press Ctrl+C to stop\n");

    let mut phase = 0.0f32;
    let step = 440.0 * std::f32::consts::TAU / sample_rate as f32;
    let mut block = vec![0.0f32; BLOCK_FRAMES * channels];

    let start = Instant::now();
    let mut frames_generated = 0u64;
    let mut last_report = Instant::now();

    loop {
        let due = (start.elapsed().as_secs_f64() * sample_rate as f64) as u64;
        if frames_generated >= due {
            sleep(Duration::from_micros(500));
            continue;
        }

        for frame in block.chunks_mut(channels) {
            frame.fill(0.25 * phase.sin());
            phase = (phase + step) % std::f32::consts::TAU;
        }
        sink.write(&block).expect("drift fifo write");
        frames_generated += BLOCK_FRAMES as u64;

        if last_report.elapsed() >= Duration::from_secs(2) {
            let xruns = sink.xruns();
            println!(
                "fill {:5} samples | overruns {} | underruns {} | contended callbacks {}",
                sink.fill_count(),
                xruns.writer.total,
                xruns.reader.total,
                sink.contended_callbacks()
            );
            last_report = Instant::now();
        }
    }
}
