//! Decode performance benchmarks
//!
//! Microbenchmarks for the transform and loop-filter kernels plus a
//! whole-frame decode of a synthetic key frame.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use zvp8_lib::filter::{normal_filter_macroblock, FilterLimits, FilterParameters, MacroblockPlanes};
use zvp8_lib::prediction::{predict_subblock, SubblockEdges};
use zvp8_lib::tables::{FilterType, SubblockMode};
use zvp8_lib::transform::{add_residual, inverse_dct4x4, inverse_wht4x4};
use zvp8_lib::{Raster, RasterHandle, Vp8Decoder};

fn minimal_key_frame(width: u16, height: u16) -> Vec<u8> {
    let tag = 0x10u32;
    let mut data = vec![tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
    data.extend_from_slice(&[0x9d, 0x01, 0x2a]);
    data.extend_from_slice(&width.to_le_bytes());
    data.extend_from_slice(&height.to_le_bytes());
    data
}

fn bench_transforms(c: &mut Criterion) {
    let coeffs: [i16; 16] = [120, -40, 32, 8, -16, 24, 4, -8, 12, 0, -4, 6, 2, 0, 1, -2];

    let mut group = c.benchmark_group("transforms");
    group.throughput(Throughput::Elements(16));

    group.bench_function("idct4x4", |b| {
        let mut out = [0i16; 16];
        b.iter(|| inverse_dct4x4(black_box(&coeffs), &mut out));
    });

    group.bench_function("wht4x4", |b| {
        let mut out = [0i16; 16];
        b.iter(|| inverse_wht4x4(black_box(&coeffs), &mut out));
    });

    group.bench_function("add_residual", |b| {
        let mut plane = vec![128u8; 16 * 16];
        let residual = [7i16; 16];
        b.iter(|| add_residual(black_box(&mut plane), 0, 16, &residual));
    });

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let edges = SubblockEdges {
        above: [100, 110, 120, 130, 140, 150, 160, 170],
        left: [90, 80, 70, 60],
        above_left: 95,
    };

    let mut group = c.benchmark_group("prediction");
    for mode in [
        SubblockMode::BDc,
        SubblockMode::BTm,
        SubblockMode::BLd,
        SubblockMode::BVr,
    ] {
        group.bench_function(format!("subblock_{mode:?}"), |b| {
            let mut plane = vec![0u8; 8 * 8];
            b.iter(|| predict_subblock(black_box(mode), &mut plane, 0, 8, &edges));
        });
    }
    group.finish();
}

fn bench_loop_filter(c: &mut Criterion) {
    let params = FilterParameters {
        filter_type: FilterType::Normal,
        filter_level: 32,
        sharpness_level: 0,
    };
    let limits = FilterLimits::new(&params, true);

    c.bench_function("normal_filter_macroblock", |b| {
        let mut y = vec![0u8; 64 * 64];
        for (i, p) in y.iter_mut().enumerate() {
            *p = ((i * 7) % 256) as u8;
        }
        let mut u = vec![128u8; 32 * 32];
        let mut v = vec![128u8; 32 * 32];

        b.iter(|| {
            let mut planes = MacroblockPlanes {
                y: &mut y,
                y_stride: 64,
                u: &mut u,
                v: &mut v,
                uv_stride: 32,
            };
            normal_filter_macroblock(black_box(&mut planes), 1, 1, &limits, false);
        });
    });
}

fn bench_frame_decode(c: &mut Criterion) {
    let data = minimal_key_frame(320, 240);

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Elements(320 * 240));
    group.bench_function("decode_320x240_key_frame", |b| {
        b.iter(|| {
            let mut decoder = Vp8Decoder::new(320, 240);
            let mut raster = RasterHandle::new(Raster::new(320, 240).unwrap());
            decoder
                .decode_frame(black_box(&data), &mut raster)
                .unwrap();
            raster
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_transforms,
    bench_prediction,
    bench_loop_filter,
    bench_frame_decode
);
criterion_main!(benches);
