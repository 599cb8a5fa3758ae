//! Video file integration tests.
//!
//! Synthetic clips are written with [`VideoWriter`] into a temporary
//! directory, so these only need FFmpeg's built-in encoders. Tests skip when
//! an encoder is not available on this platform.

use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use subgrid::{
    FrameSink, FrameSource, OutputCodec, PostProcessor, SignalOptions, SignalVerifier,
    SubgridError, SubtitleEmbedder, VideoCodec, VideoReader, VideoWriter,
};

const SUBTITLES: &str = "1
00:00:00,000 --> 00:00:01,000
Hello

2
00:00:02,000 --> 00:00:03,000
World
";

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

/// Write `count` frames of a dark gradient. Returns `false` if the encoder
/// is unavailable.
fn write_gradient(path: &Path, count: u32, codec: VideoCodec) -> bool {
    let mut writer = match VideoWriter::create(path, 240, 240, 10.0, codec) {
        Ok(writer) => writer,
        Err(SubgridError::VideoEncodeError(message)) => {
            eprintln!("Skipping: {codec:?} encoder not available ({message})");
            return false;
        }
        Err(error) => panic!("create writer: {error}"),
    };
    for index in 0..count {
        let frame = RgbImage::from_fn(240, 240, |x, y| {
            Rgb([(x / 8) as u8, (y / 8) as u8, (index * 2) as u8])
        });
        writer.write_frame(&frame).expect("write frame");
    }
    writer.finish().expect("finish");
    true
}

struct CopyProcessor;

impl PostProcessor for CopyProcessor {
    fn process(&self, input: &Path, output: &Path) -> Result<(), SubgridError> {
        fs::copy(input, output)?;
        Ok(())
    }
}

struct FailingProcessor;

impl PostProcessor for FailingProcessor {
    fn process(&self, _input: &Path, _output: &Path) -> Result<(), SubgridError> {
        Err(SubgridError::TranscodeError("not today".to_string()))
    }
}

// ── Reader and writer ──────────────────────────────────────────────

#[test]
fn ffv1_round_trip_is_exact() {
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("gradient.mkv");
    if !write_gradient(&path, 5, VideoCodec::Ffv1) {
        return;
    }

    let mut reader = VideoReader::open(&path).expect("open");
    let properties = reader.properties();
    assert_eq!((properties.width, properties.height), (240, 240));
    assert!((properties.frames_per_second - 10.0).abs() < 0.5);

    let mut count = 0u32;
    while let Some(frame) = reader.read_frame().expect("read frame") {
        let expected = RgbImage::from_fn(240, 240, |x, y| {
            Rgb([(x / 8) as u8, (y / 8) as u8, (count * 2) as u8])
        });
        assert_eq!(frame, expected, "frame {count}");
        count += 1;
    }
    assert_eq!(count, 5);
}

#[test]
fn writer_rejects_wrong_frame_size() {
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("sized.mkv");
    let mut writer = match VideoWriter::create(&path, 240, 240, 10.0, VideoCodec::Ffv1) {
        Ok(writer) => writer,
        Err(error) => {
            eprintln!("Skipping: {error}");
            return;
        }
    };
    let result = writer.write_frame(&RgbImage::new(120, 120));
    assert!(matches!(result, Err(SubgridError::VideoWriteError(_))));
    assert_eq!(writer.frames_written(), 0);
}

#[test]
fn missing_video_is_a_file_open_error() {
    let result = VideoReader::open("definitely/not/here.mp4");
    assert!(matches!(result, Err(SubgridError::FileOpen { .. })));
}

// ── Embed and verify ───────────────────────────────────────────────

#[test]
fn embed_then_verify_lossless() {
    let directory = tempfile::tempdir().expect("temp dir");
    let input = directory.path().join("input.mkv");
    let subtitles = directory.path().join("input.srt");
    let output = directory.path().join("output.mkv");
    if !write_gradient(&input, 40, VideoCodec::Ffv1) {
        return;
    }
    fs::write(&subtitles, SUBTITLES).expect("write subtitles");

    let outcome = SubtitleEmbedder::new(&input, &subtitles, &output)
        .with_codec(OutputCodec::Ffv1)
        .run()
        .expect("embed");
    assert_eq!(outcome.report.frames, 40);
    assert_eq!(outcome.report.signal_frames, 8);
    assert_eq!(outcome.output.path, output);
    assert!(!outcome.output.transcoded);

    let report = SignalVerifier::new(&output)
        .with_options(SignalOptions::new().with_decode_interval(1))
        .run()
        .expect("verify");
    let found: Vec<(u64, &str)> = report
        .transitions
        .iter()
        .map(|transition| (transition.frame_number, transition.text.as_str()))
        .collect();
    assert_eq!(found, vec![(0, "Hello"), (20, "World")]);
}

#[test]
fn embed_with_mpeg4_survives_compression() {
    let directory = tempfile::tempdir().expect("temp dir");
    let input = directory.path().join("input.mkv");
    let subtitles = directory.path().join("input.srt");
    let output = directory.path().join("output.mp4");
    if !write_gradient(&input, 40, VideoCodec::Ffv1) {
        return;
    }
    fs::write(&subtitles, SUBTITLES).expect("write subtitles");

    match SubtitleEmbedder::new(&input, &subtitles, &output).run() {
        Ok(outcome) => assert_eq!(outcome.report.frames, 40),
        Err(SubgridError::VideoEncodeError(message)) => {
            eprintln!("Skipping: MPEG-4 encoder not available ({message})");
            return;
        }
        Err(error) => panic!("embed: {error}"),
    }

    let report = SignalVerifier::new(&output)
        .with_options(SignalOptions::new().with_decode_interval(1))
        .run()
        .expect("verify");
    let texts: Vec<&str> = report
        .transitions
        .iter()
        .map(|transition| transition.text.as_str())
        .collect();
    assert!(texts.contains(&"Hello"), "recovered {texts:?}");
    assert!(texts.contains(&"World"), "recovered {texts:?}");
}

#[test]
fn post_processed_output_replaces_intermediate() {
    let directory = tempfile::tempdir().expect("temp dir");
    let input = directory.path().join("input.mkv");
    let subtitles = directory.path().join("input.srt");
    let output = directory.path().join("final.mkv");
    if !write_gradient(&input, 10, VideoCodec::Ffv1) {
        return;
    }
    fs::write(&subtitles, SUBTITLES).expect("write subtitles");

    let outcome = SubtitleEmbedder::new(&input, &subtitles, &output)
        .with_codec(OutputCodec::H264)
        .with_post_processor(CopyProcessor)
        .run()
        .expect("embed");

    assert!(outcome.output.transcoded);
    assert_eq!(outcome.output.path, output);
    assert!(output.exists());
    assert!(!directory.path().join("final_temp.mkv").exists());
}

#[test]
fn failed_post_processing_keeps_lossless_file() {
    let directory = tempfile::tempdir().expect("temp dir");
    let input = directory.path().join("input.mkv");
    let subtitles = directory.path().join("input.srt");
    let output = directory.path().join("final.mp4");
    if !write_gradient(&input, 10, VideoCodec::Ffv1) {
        return;
    }
    fs::write(&subtitles, SUBTITLES).expect("write subtitles");

    let outcome = SubtitleEmbedder::new(&input, &subtitles, &output)
        .with_codec(OutputCodec::H264)
        .with_post_processor(FailingProcessor)
        .run()
        .expect("a failed transcode still succeeds");

    let fallback = directory.path().join("final.mkv");
    assert!(!outcome.output.transcoded);
    assert_eq!(outcome.output.path, fallback);
    assert!(fallback.exists());
    assert!(!output.exists());

    let report = SignalVerifier::new(&fallback).run().expect("verify");
    assert_eq!(report.transitions[0].text, "Hello");
}

#[test]
fn existing_intermediate_is_not_replaced() {
    let directory = tempfile::tempdir().expect("temp dir");
    let input = directory.path().join("input.mkv");
    let subtitles = directory.path().join("input.srt");
    let output = directory.path().join("final.mp4");
    let intermediate = directory.path().join("final_temp.mkv");
    if !write_gradient(&input, 10, VideoCodec::Ffv1) {
        return;
    }
    fs::write(&subtitles, SUBTITLES).expect("write subtitles");
    fs::write(&intermediate, b"someone else's file").expect("write intermediate");

    let result = SubtitleEmbedder::new(&input, &subtitles, &output)
        .with_codec(OutputCodec::H264)
        .with_post_processor(CopyProcessor)
        .run();

    assert!(matches!(result, Err(SubgridError::OutputCreate { .. })));
    assert_eq!(
        fs::read(&intermediate).expect("read intermediate"),
        b"someone else's file"
    );
    assert!(!output.exists());
}

#[test]
fn existing_output_needs_overwrite() {
    let directory = tempfile::tempdir().expect("temp dir");
    let input = directory.path().join("input.mkv");
    let subtitles = directory.path().join("input.srt");
    let output = directory.path().join("output.mkv");
    if !write_gradient(&input, 10, VideoCodec::Ffv1) {
        return;
    }
    fs::write(&subtitles, SUBTITLES).expect("write subtitles");
    fs::write(&output, b"previous run").expect("write output");

    let refused = SubtitleEmbedder::new(&input, &subtitles, &output)
        .with_codec(OutputCodec::Ffv1)
        .run();
    assert!(matches!(refused, Err(SubgridError::OutputCreate { .. })));
    assert_eq!(fs::read(&output).expect("read output"), b"previous run");

    let outcome = SubtitleEmbedder::new(&input, &subtitles, &output)
        .with_codec(OutputCodec::Ffv1)
        .with_overwrite(true)
        .run()
        .expect("embed");
    assert_eq!(outcome.report.frames, 10);
}

// ── Fixture ────────────────────────────────────────────────────────

#[test]
fn embed_into_sample_video() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let directory = tempfile::tempdir().expect("temp dir");
    let subtitles = directory.path().join("sample.srt");
    let output = directory.path().join("sample_signal.mkv");
    fs::write(&subtitles, SUBTITLES).expect("write subtitles");

    let outcome = SubtitleEmbedder::new(path, &subtitles, &output)
        .with_codec(OutputCodec::Ffv1)
        .run()
        .expect("embed");
    assert!(outcome.report.frames > 0);

    let report = SignalVerifier::new(&output).run().expect("verify");
    assert_eq!(report.frames, outcome.report.frames);
}
