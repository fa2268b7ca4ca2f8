use criterion::{black_box, criterion_group, criterion_main, Criterion};
use puffer::{
    DoubleBuffer, DoubleBufferConfig, DriftConfig, DriftFifo, Fifo, FifoReader, FifoWriter,
    LockFreeFifo,
};

const BLOCK: usize = 480;

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("LockFreeFifo write+read 480", |b| {
        let (mut producer, mut consumer) = LockFreeFifo::new(4096, 0.0f32).unwrap();
        let input = [0.25f32; BLOCK];
        let mut output = [0.0f32; BLOCK];

        b.iter(|| {
            producer.write(black_box(&input)).unwrap();
            consumer.read(black_box(&mut output)).unwrap();
        })
    });

    c.bench_function("rtrb write_chunk+read_chunk 480", |b| {
        let (mut producer, mut consumer) = rtrb::RingBuffer::<f32>::new(4096);
        let input = [0.25f32; BLOCK];
        let mut output = [0.0f32; BLOCK];

        b.iter(|| {
            let mut chunk = producer.write_chunk(BLOCK).unwrap();
            let (first, second) = chunk.as_mut_slices();
            first.copy_from_slice(&input[..first.len()]);
            second.copy_from_slice(&input[first.len()..]);
            chunk.commit_all();

            let chunk = consumer.read_chunk(BLOCK).unwrap();
            let (first, second) = chunk.as_slices();
            output[..first.len()].copy_from_slice(first);
            output[first.len()..].copy_from_slice(second);
            chunk.commit_all();
            black_box(&output);
        })
    });

    c.bench_function("DriftFifo steady state 480", |b| {
        let mut fifo = DriftFifo::new(DriftConfig::new(BLOCK, 2 * BLOCK, 8 * BLOCK), 0.0f32).unwrap();
        let input = [0.25f32; BLOCK];
        let mut output = [0.0f32; BLOCK];

        b.iter(|| {
            fifo.write(black_box(&input)).unwrap();
            fifo.read(black_box(&mut output)).unwrap();
        })
    });

    c.bench_function("DoubleBuffer 512 -> 128 lock-free", |b| {
        // The outer side reads before the inner side has run, so the delay
        // covers one outer block.
        let config = DoubleBufferConfig::new(512, 128, 512);
        let (mut outer, mut inner) = DoubleBuffer::new::<LockFreeFifo, _>(config, 0.0f32).unwrap();
        let input = [0.25f32; 512];
        let mut output = [0.0f32; 512];
        let mut block = [0.0f32; 128];

        b.iter(|| {
            outer.process(black_box(&input), &mut output, 512).unwrap();
            while inner.input_fifo_fill_count() >= 128 {
                inner.input(&mut block).unwrap();
                inner.output(&block).unwrap();
            }
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
