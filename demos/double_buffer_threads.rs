//! Adapt a 64-frame "audio callback" to a 48-frame processing thread
//!
//! Run with: cargo run --example double_buffer_threads
//!
//! The main thread plays the role of the driver callback; a worker thread
//! applies a gain in blocks of its own size. Shutting down injects an error
//! into the worker, which is how a blocked processing thread is stopped.

use std::thread;
use std::time::Duration;

use puffer::{BlockingFifo, DoubleBuffer, DoubleBufferConfig, FifoError};
use tracing::info;

const OUTER: usize = 64;
const INNER: usize = 48;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut config = DoubleBufferConfig::new(OUTER, INNER, 0).with_channels(2, 2);
    config.delay = config.minimum_delay();
    info!(?config, fifo_size = config.fifo_size(), "double buffer");

    let (mut outer, mut inner) =
        DoubleBuffer::new::<BlockingFifo, _>(config, 0.0f32).expect("double buffer");

    let worker = thread::spawn(move || {
        let mut block = vec![0.0f32; INNER * 2];
        let mut blocks = 0usize;
        loop {
            if let Err(e) = inner.input(&mut block) {
                info!(blocks, error = %e, "worker stopping");
                return blocks;
            }
            for sample in block.iter_mut() {
                *sample *= 0.5;
            }
            if let Err(e) = inner.output(&block) {
                info!(blocks, error = %e, "worker stopping");
                return blocks;
            }
            blocks += 1;
        }
    });

    let input: Vec<f32> = (0..OUTER * 2).map(|n| n as f32).collect();
    let mut output = vec![0.0f32; OUTER * 2];

    for period in 0..200 {
        outer
            .process(&input, &mut output, OUTER)
            .expect("outer process");
        if period % 50 == 0 {
            info!(period, first = output[0], last = output[OUTER * 2 - 1], "callback");
        }
        // 64 frames at 48kHz
        thread::sleep(Duration::from_micros(1333));
    }

    outer.provoke_inner_error(FifoError::aborted("shutdown"));
    let blocks = worker.join().expect("worker panicked");
    println!("worker processed {} blocks of {} frames", blocks, INNER);
}
