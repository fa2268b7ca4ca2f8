//! Swap settings into a real-time loop without locking
//!
//! Run with: cargo run --example config_handoff
//!
//! A control thread builds new filter settings (allocating freely) and pushes
//! them; the "audio" loop picks up the newest one at the start of each block.

use std::thread;
use std::time::Duration;

use puffer::ConfigQueue;
use tracing::info;

#[derive(Debug)]
struct Settings {
    version: u32,
    gains: Vec<f32>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let (mut writer, mut reader) = ConfigQueue::new::<Settings>();

    let control = thread::spawn(move || {
        for version in 1..=20 {
            writer.push(Settings {
                version,
                gains: (0..8).map(|ch| 1.0 / (ch + version) as f32).collect(),
            });
            info!(version, retained = writer.retained(), "pushed settings");
            thread::sleep(Duration::from_millis(7));
        }
    });

    let mut block = [1.0f32; 8];
    let mut applied = 0;
    for _ in 0..100 {
        if let Some(settings) = reader.poll() {
            for (sample, gain) in block.iter_mut().zip(&settings.gains) {
                *sample = *gain;
            }
            if settings.version != applied {
                applied = settings.version;
                info!(version = applied, first_gain = block[0], "audio loop picked up settings");
            }
        }
        thread::sleep(Duration::from_millis(2));
    }

    control.join().expect("control thread panicked");
}
