//! Correlation hot-path benchmarks.

use criterion::{Criterion, criterion_group, criterion_main};
use piv_algos::{Direction, Fft};
use piv_core::{GfImage, Gray, Size, util};
use std::hint::black_box;

fn interrogation_window(size: Size) -> GfImage {
    let mut im = GfImage::with_size(size);
    util::fill_with(&mut im, |x, y| {
        Gray(((x as f64 * 0.61).sin() * (y as f64 * 0.37).cos()).abs() * 255.0)
    });
    im
}

fn bench_transform(c: &mut Criterion) {
    for n in [32u32, 64] {
        let size = Size::new(n, n);
        let fft = Fft::new(size).unwrap();
        let im = interrogation_window(size);

        c.bench_function(&format!("transform_{n}x{n}"), |b| {
            b.iter(|| fft.transform(black_box(&im), Direction::Forward).unwrap())
        });
    }
}

fn bench_cross_correlate(c: &mut Criterion) {
    for n in [32u32, 64] {
        let size = Size::new(n, n);
        let fft = Fft::new(size).unwrap();
        let a = interrogation_window(size);
        let b_im = interrogation_window(size);

        c.bench_function(&format!("cross_correlate_{n}x{n}"), |b| {
            b.iter(|| fft.cross_correlate(black_box(&a), black_box(&b_im)).unwrap())
        });
    }
}

criterion_group!(benches, bench_transform, bench_cross_correlate);
criterion_main!(benches);
