use artrack::core::{Camera, Frame, PixelFormat};
use artrack::pattern::{IdDictionary, IdEncoding, ID_GRID};
use artrack::{MarkerMode, Tracker, TrackerConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const W: usize = 640;
const H: usize = 480;

/// Axis-aligned ID markers of `side` pixels on white.
fn id_scene(ids: &[u32], side: usize) -> Vec<u8> {
    let dict = IdDictionary::new(IdEncoding::Bch);
    let mut px = vec![255u8; W * H];
    let cell = side / 12;
    for (n, &id) in ids.iter().enumerate() {
        let code = dict.code(id).expect("id");
        let x0 = 40 + (n % 4) * (side + 30);
        let y0 = 40 + (n / 4) * (side + 30);
        for y in 0..side {
            for x in 0..side {
                let (bx, by) = (x / cell, y / cell);
                let dark = if (3..9).contains(&bx) && (3..9).contains(&by) {
                    let bit = (by - 3) * ID_GRID + (bx - 3);
                    (code >> bit) & 1 == 1
                } else {
                    true
                };
                if dark {
                    px[(y0 + y) * W + x0 + x] = 0;
                }
            }
        }
    }
    px
}

fn bench_track(c: &mut Criterion) {
    let camera = Camera::pinhole(W, H, 600.0, 600.0, 320.0, 240.0).expect("camera");
    let config = TrackerConfig {
        marker_mode: MarkerMode::Id,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config.clone(), camera.clone()).expect("tracker");

    let blank = vec![255u8; W * H];
    c.bench_function("track_blank_640x480", |b| {
        b.iter(|| {
            let frame = Frame::new(W, H, PixelFormat::Lum, black_box(&blank)).expect("frame");
            tracker.track(&frame, None).expect("track").markers.len()
        })
    });

    let scene = id_scene(&[3, 77, 512, 2047], 96);
    c.bench_function("track_4_id_markers_640x480", |b| {
        b.iter(|| {
            let frame = Frame::new(W, H, PixelFormat::Lum, black_box(&scene)).expect("frame");
            tracker.track(&frame, None).expect("track").markers.len()
        })
    });

    let mut half = config;
    half.square.half_resolution = true;
    let mut tracker = Tracker::new(half, camera).expect("tracker");
    c.bench_function("track_4_id_markers_640x480_half", |b| {
        b.iter(|| {
            let frame = Frame::new(W, H, PixelFormat::Lum, black_box(&scene)).expect("frame");
            tracker.track(&frame, None).expect("track").markers.len()
        })
    });
}

criterion_group!(benches, bench_track);
criterion_main!(benches);
