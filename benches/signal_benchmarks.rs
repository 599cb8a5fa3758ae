//! Benchmarks for the per-frame signal path.
//!
//! Run with: cargo bench
//!
//! Everything runs on synthetic frames; the file benchmark additionally
//! needs `tests/fixtures/sample_video.mp4`.

use std::hint::black_box;
use std::path::Path;

use criterion::{BenchmarkId, Criterion};
use image::{Rgb, RgbImage};
use subgrid::{
    FrameSequencer, FrameSink, FrameSource, GridCodec, PacketEncoder, SignalOptions,
    SignalVerifier, SubgridError, Timeline, VideoProperties, embed_stream, parse_srt,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

const SUBTITLES: &str = "1
00:00:00,000 --> 00:00:02,000
The quick brown fox jumps over the lazy dog

2
00:00:03,000 --> 00:00:05,000
Pack my box with five dozen liquor jugs
";

struct RepeatSource {
    frame: RgbImage,
    remaining: u64,
}

impl FrameSource for RepeatSource {
    fn properties(&self) -> VideoProperties {
        VideoProperties {
            frames_per_second: 25.0,
            width: self.frame.width(),
            height: self.frame.height(),
            frame_count: self.remaining,
        }
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, SubgridError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(self.frame.clone()))
    }
}

struct DiscardSink;

impl FrameSink for DiscardSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), SubgridError> {
        black_box(frame);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SubgridError> {
        Ok(())
    }
}

fn textured_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 64) as u8, (y % 48) as u8, ((x + y) % 32) as u8])
    })
}

fn benchmark_grid_codec(criterion: &mut Criterion) {
    let options = SignalOptions::new();
    let encoder = PacketEncoder::from_options(&options).unwrap();
    let bits = encoder.packet_to_matrix(&encoder.pack("Benchmark text!!"));

    let mut group = criterion.benchmark_group("grid codec");
    for (width, height) in [(640, 360), (1280, 720), (1920, 1080)] {
        let codec = GridCodec::new(&options, width, height).unwrap();
        let frame = textured_frame(width, height);
        let label = format!("{width}x{height}");

        group.bench_with_input(BenchmarkId::new("embed", &label), &frame, |bencher, frame| {
            bencher.iter(|| {
                let mut copy = frame.clone();
                codec.embed(&mut copy, &bits);
                copy
            });
        });

        let mut marked = frame.clone();
        codec.embed(&mut marked, &bits);
        group.bench_with_input(BenchmarkId::new("decode", &label), &marked, |bencher, frame| {
            bencher.iter(|| codec.decode(black_box(frame)));
        });
    }
    group.finish();
}

fn benchmark_packets(criterion: &mut Criterion) {
    let encoder = PacketEncoder::from_options(&SignalOptions::new()).unwrap();
    let long_text = "subtitle text ".repeat(20);

    criterion.bench_function("sequence 280 chars", |bencher| {
        bencher.iter(|| encoder.sequence(black_box(&long_text)));
    });

    criterion.bench_function("parse srt", |bencher| {
        bencher.iter(|| parse_srt(black_box(SUBTITLES)));
    });
}

fn benchmark_sequencer(criterion: &mut Criterion) {
    let timeline = Timeline::from_srt_str(SUBTITLES);
    let options = SignalOptions::new();

    criterion.bench_function("sequencer 150 frames", |bencher| {
        bencher.iter(|| {
            let mut sequencer = FrameSequencer::new(&timeline, &options).unwrap();
            for frame in 0..150 {
                black_box(sequencer.step(timeline.lookup_frame(frame, 25.0)));
            }
        });
    });
}

fn benchmark_embed_loop(criterion: &mut Criterion) {
    let timeline = Timeline::from_srt_str(SUBTITLES);
    let options = SignalOptions::new();
    let frame = textured_frame(640, 360);

    let mut group = criterion.benchmark_group("embed loop");
    group.sample_size(20);
    group.bench_function("125 frames at 640x360", |bencher| {
        bencher.iter(|| {
            let mut source = RepeatSource {
                frame: frame.clone(),
                remaining: 125,
            };
            embed_stream(&mut source, &mut DiscardSink, &timeline, &options).unwrap()
        });
    });
    group.finish();
}

fn benchmark_verify_file(criterion: &mut Criterion) {
    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }
    subgrid::set_ffmpeg_log_level(log::LevelFilter::Error);

    let mut group = criterion.benchmark_group("file");
    group.sample_size(10);
    group.bench_function("verify sample video", |bencher| {
        bencher.iter(|| SignalVerifier::new(SAMPLE_VIDEO).run().unwrap());
    });
    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_grid_codec,
    benchmark_packets,
    benchmark_sequencer,
    benchmark_embed_loop,
    benchmark_verify_file,
);
criterion::criterion_main!(benches);
