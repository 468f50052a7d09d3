// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parloop::{CpuPinningPolicy, LoopDispatcher, LoopRange, ThreadCount, ThreadPoolBuilder};
use std::sync::{Arc, Mutex};

const NUM_THREADS: &[usize] = &[1, 2, 4, 8];
const HEIGHTS: &[usize] = &[128, 1024, 4096];
const WIDTH: usize = 1024;

/// Synthetic per-scanline conversion: each destination row is derived from
/// the matching source row.
fn convert_row(src: &[u8], dst: &mut [u8], y: usize) {
    for (x, (d, s)) in dst.iter_mut().zip(src.iter()).enumerate() {
        *d = s.wrapping_mul(31).wrapping_add((x ^ y) as u8);
    }
}

fn make_source(height: usize) -> Vec<Vec<u8>> {
    (0..height)
        .map(|y| (0..WIDTH).map(|x| ((x + y) % 256) as u8).collect())
        .collect()
}

fn scanlines(c: &mut Criterion) {
    let _ = env_logger::try_init();

    let mut group = c.benchmark_group("scanlines");
    for &height in HEIGHTS {
        group.throughput(Throughput::Bytes((height * WIDTH) as u64));

        group.bench_with_input(BenchmarkId::new("serial", height), &height, |b, &height| {
            let src = make_source(height);
            let mut dst = vec![vec![0u8; WIDTH]; height];
            b.iter(|| {
                for y in 0..height {
                    convert_row(&src[y], &mut dst[y], y);
                }
            });
        });

        for &num_threads in NUM_THREADS {
            group.bench_with_input(
                BenchmarkId::new(format!("pool@{num_threads}"), height),
                &height,
                |b, &height| {
                    let pool = ThreadPoolBuilder {
                        num_threads: ThreadCount::try_from(num_threads).unwrap(),
                        cpu_pinning: CpuPinningPolicy::No,
                    }
                    .build();
                    let src = Arc::new(make_source(height));
                    let dst: Arc<Vec<Mutex<Vec<u8>>>> = Arc::new(
                        (0..height).map(|_| Mutex::new(vec![0u8; WIDTH])).collect(),
                    );
                    let range = LoopRange::new(0, height as i64, 1, 16).unwrap();
                    let dispatcher = LoopDispatcher::with_range(&pool, range);

                    b.iter(|| {
                        dispatcher
                            .dispatch(|| {
                                let src = src.clone();
                                let dst = dst.clone();
                                move |begin: i64, end: i64, step: i64| {
                                    let mut y = begin;
                                    while y < end {
                                        let mut row = dst[y as usize].lock().unwrap();
                                        convert_row(&src[y as usize], &mut row, y as usize);
                                        y += step;
                                    }
                                }
                            })
                            .unwrap();
                    });

                    pool.join().unwrap();
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, scanlines);
criterion_main!(benches);
