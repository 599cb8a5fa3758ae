//! End-to-end embedding and verification.
//!
//! [`embed_stream`] and [`verify_stream`] are the frame loops. They work on
//! any [`FrameSource`] / [`FrameSink`] pair and hold one frame at a time.
//! [`SubtitleEmbedder`] and [`SignalVerifier`] wire those loops to files:
//! they open the video, load the subtitles, pick the writer codec, and run
//! post-processing when the codec calls for it.
//!
//! # Example
//!
//! ```no_run
//! use subgrid::{OutputCodec, SignalOptions, SignalVerifier, SubtitleEmbedder};
//!
//! let outcome = SubtitleEmbedder::new("talk.mp4", "talk.srt", "talk_signal.mkv")
//!     .with_codec(OutputCodec::Ffv1)
//!     .with_options(SignalOptions::new().with_repetition(6))
//!     .run()?;
//! println!("{} frames written", outcome.report.frames);
//!
//! let report = SignalVerifier::new(&outcome.output.path)
//!     .with_options(SignalOptions::new().with_decode_interval(1))
//!     .run()?;
//! for transition in &report.transitions {
//!     println!("{} ms: {}", transition.time_ms, transition.text);
//! }
//! # Ok::<(), subgrid::SubgridError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::GridCodec;
use crate::configuration::SignalOptions;
use crate::decoder::{SignalDecoder, TextTransition};
use crate::encode::{VideoCodec, VideoWriter};
use crate::error::SubgridError;
use crate::progress::{NoOpProgress, OperationType, ProgressCallback, ProgressTracker};
use crate::sequencer::{FrameSequencer, FrameSignal};
use crate::timeline::Timeline;
use crate::transcode::{FfmpegTranscoder, FinalOutput, PostProcessor, finalize_output, intermediate_path};
use crate::video::{FrameSink, FrameSource, VideoProperties, VideoReader};

const DEFAULT_BATCH_SIZE: u64 = 30;

/// Output codec selection for [`SubtitleEmbedder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCodec {
    /// MPEG-4 Part 2, written directly. This is the default.
    #[default]
    Mp4v,
    /// Motion JPEG, written directly.
    Mjpg,
    /// FFV1, written directly and lossless.
    Ffv1,
    /// Lossless H.264: an FFV1 intermediate transcoded by a
    /// [`PostProcessor`].
    H264,
}

impl OutputCodec {
    /// Codec the in-process writer uses.
    pub fn writer_codec(self) -> VideoCodec {
        match self {
            OutputCodec::Mp4v => VideoCodec::Mpeg4,
            OutputCodec::Mjpg => VideoCodec::Mjpeg,
            OutputCodec::Ffv1 | OutputCodec::H264 => VideoCodec::Ffv1,
        }
    }

    /// Whether the written file is an intermediate for post-processing.
    pub fn needs_post_processing(self) -> bool {
        matches!(self, OutputCodec::H264)
    }

    /// Command-line name.
    pub fn name(self) -> &'static str {
        match self {
            OutputCodec::Mp4v => "mp4v",
            OutputCodec::Mjpg => "mjpg",
            OutputCodec::Ffv1 => "ffv1",
            OutputCodec::H264 => "h264",
        }
    }
}

/// Summary of an embedding run.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedReport {
    /// Properties of the source stream.
    pub properties: VideoProperties,
    /// Frames read and written.
    pub frames: u64,
    /// Frames that carried a packet.
    pub signal_frames: u64,
    /// Subtitles that got at least one packet onto the grid.
    pub subtitles_signalled: usize,
}

/// Summary of a verification run.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    /// Properties of the source stream.
    pub properties: VideoProperties,
    /// Frames read.
    pub frames: u64,
    /// Frames decoded.
    pub sampled_frames: u64,
    /// Text changes in order of appearance.
    pub transitions: Vec<TextTransition>,
}

/// Embed `timeline` into every frame of `source`, writing to `sink`.
///
/// A read failure ends the loop early and is logged; a write failure
/// aborts the run.
///
/// # Errors
///
/// Returns an error if `options` are invalid, the frame size cannot hold
/// the grid, or the sink fails.
pub fn embed_stream<S, W>(
    source: &mut S,
    sink: &mut W,
    timeline: &Timeline,
    options: &SignalOptions,
) -> Result<EmbedReport, SubgridError>
where
    S: FrameSource + ?Sized,
    W: FrameSink + ?Sized,
{
    let mut tracker = ProgressTracker::new(
        Arc::new(NoOpProgress),
        OperationType::Embedding,
        None,
        DEFAULT_BATCH_SIZE,
    );
    run_embed(source, sink, timeline, options, false, &mut tracker)
}

/// Decode the signal from every sampled frame of `source`.
///
/// # Errors
///
/// Returns an error if `options` are invalid or the frame size cannot hold
/// the grid.
pub fn verify_stream<S>(source: &mut S, options: &SignalOptions) -> Result<VerifyReport, SubgridError>
where
    S: FrameSource + ?Sized,
{
    let mut tracker = ProgressTracker::new(
        Arc::new(NoOpProgress),
        OperationType::Verification,
        None,
        DEFAULT_BATCH_SIZE,
    );
    run_verify(source, options, &mut tracker)
}

fn run_embed<S, W>(
    source: &mut S,
    sink: &mut W,
    timeline: &Timeline,
    options: &SignalOptions,
    debug_overlay: bool,
    tracker: &mut ProgressTracker,
) -> Result<EmbedReport, SubgridError>
where
    S: FrameSource + ?Sized,
    W: FrameSink + ?Sized,
{
    options.validate()?;
    let properties = source.properties();
    let codec = GridCodec::new(options, properties.width, properties.height)?;
    let mut sequencer = FrameSequencer::new(timeline, options)?;
    let encoder = sequencer.encoder().clone();

    log::info!(
        "Embedding {} subtitles ({} chars per packet, {}x repetition)",
        timeline.len(),
        encoder.grid().capacity_chars(),
        encoder.repetition()
    );

    let mut frames = 0u64;
    let mut signal_frames = 0u64;
    let mut subtitles_signalled = 0usize;
    let mut last_signalled: Option<u32> = None;

    loop {
        let mut frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(error) => {
                log::warn!("Stopping at frame {frames}: {error}");
                break;
            }
        };
        if frame.dimensions() != (properties.width, properties.height) {
            log::warn!(
                "Stopping at frame {frames}: size changed to {}x{}",
                frame.width(),
                frame.height()
            );
            break;
        }

        let active = timeline.lookup_frame(frames, properties.frames_per_second);
        match sequencer.step(active) {
            FrameSignal::Packet(packet) => {
                codec.embed(&mut frame, &encoder.packet_to_matrix(packet));
                signal_frames += 1;
                let index = active.map(|entry| entry.index);
                if index != last_signalled {
                    last_signalled = index;
                    subtitles_signalled += 1;
                }
            }
            FrameSignal::Empty => codec.embed_empty(&mut frame),
        }
        if debug_overlay {
            codec.draw_grid_overlay(&mut frame);
        }

        sink.write_frame(&frame)?;
        frames += 1;
        tracker.advance();
    }

    sink.finish()?;
    tracker.finish();

    log::info!(
        "Embedded {frames} frames, {signal_frames} carrying a packet, {subtitles_signalled} subtitles signalled"
    );

    Ok(EmbedReport {
        properties,
        frames,
        signal_frames,
        subtitles_signalled,
    })
}

fn run_verify<S>(
    source: &mut S,
    options: &SignalOptions,
    tracker: &mut ProgressTracker,
) -> Result<VerifyReport, SubgridError>
where
    S: FrameSource + ?Sized,
{
    options.validate()?;
    let properties = source.properties();
    let mut decoder = SignalDecoder::new(
        options,
        properties.width,
        properties.height,
        properties.frames_per_second,
    )?;

    let mut frames = 0u64;
    let mut sampled_frames = 0u64;
    let mut transitions = Vec::new();

    loop {
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(error) => {
                log::warn!("Stopping at frame {frames}: {error}");
                break;
            }
        };

        if decoder.samples(frames) {
            sampled_frames += 1;
        }
        if let Some(transition) = decoder.observe(frames, &frame) {
            log::info!(
                "Frame {} ({} ms): {}",
                transition.frame_number,
                transition.time_ms,
                transition.text
            );
            transitions.push(transition);
        }

        frames += 1;
        tracker.advance();
    }
    tracker.finish();

    log::info!(
        "Verified {frames} frames ({sampled_frames} sampled), {} text changes",
        transitions.len()
    );

    Ok(VerifyReport {
        properties,
        frames,
        sampled_frames,
        transitions,
    })
}

/// Result of [`SubtitleEmbedder::run`].
#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    /// Frame loop summary.
    pub report: EmbedReport,
    /// Where the output ended up. `transcoded` is `true` only when a
    /// post-processor produced it.
    pub output: FinalOutput,
}

/// Embeds a subtitle file into a video file.
///
/// Created with [`SubtitleEmbedder::new`]; configure with the `with_*`
/// methods, then call [`run`](SubtitleEmbedder::run).
#[must_use]
pub struct SubtitleEmbedder {
    video: PathBuf,
    subtitles: PathBuf,
    output: PathBuf,
    codec: OutputCodec,
    debug_overlay: bool,
    options: SignalOptions,
    progress: Arc<dyn ProgressCallback>,
    batch_size: u64,
    post_processor: Box<dyn PostProcessor>,
    overwrite: bool,
}

impl SubtitleEmbedder {
    /// Embed `subtitles` into `video`, writing `output`.
    pub fn new<V, S, O>(video: V, subtitles: S, output: O) -> Self
    where
        V: AsRef<Path>,
        S: AsRef<Path>,
        O: AsRef<Path>,
    {
        Self {
            video: video.as_ref().to_path_buf(),
            subtitles: subtitles.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            codec: OutputCodec::default(),
            debug_overlay: false,
            options: SignalOptions::new(),
            progress: Arc::new(NoOpProgress),
            batch_size: DEFAULT_BATCH_SIZE,
            post_processor: Box::new(FfmpegTranscoder::new()),
            overwrite: false,
        }
    }

    /// Set the output codec.
    pub fn with_codec(mut self, codec: OutputCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Draw cell boundaries on every frame.
    pub fn with_debug_overlay(mut self, enabled: bool) -> Self {
        self.debug_overlay = enabled;
        self
    }

    /// Set the signal options.
    pub fn with_options(mut self, options: SignalOptions) -> Self {
        self.options = options;
        self
    }

    /// Report progress to `callback`.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Report progress every `batch_size` frames.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Replace the post-processor used for [`OutputCodec::H264`].
    pub fn with_post_processor(mut self, processor: impl PostProcessor + 'static) -> Self {
        self.post_processor = Box::new(processor);
        self
    }

    /// Allow the run to replace existing files: the output, the
    /// `<stem>_temp.mkv` intermediate, and the fallback kept when
    /// post-processing fails. Off by default.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Run the embedding.
    ///
    /// # Errors
    ///
    /// - [`SubgridError::InvalidGrid`] / [`SubgridError::InvalidConfiguration`]
    ///   for bad options, before anything is opened.
    /// - [`SubgridError::FileOpen`] if the video cannot be opened.
    /// - [`SubgridError::IoError`] if the subtitles cannot be read.
    /// - [`SubgridError::OutputCreate`] if the output cannot be created, or
    ///   if it or the intermediate already exists and overwriting is off.
    /// - Any error from writing frames.
    ///
    /// A post-processing failure is not an error; see
    /// [`finalize_output`].
    pub fn run(self) -> Result<EmbedOutcome, SubgridError> {
        self.options.validate()?;

        let timeline = Timeline::from_srt_file(&self.subtitles)?;
        if timeline.is_empty() {
            log::warn!(
                "No subtitles found in {}; output will carry no signal",
                self.subtitles.display()
            );
        }

        let mut reader = VideoReader::open(&self.video)?;
        let properties = reader.properties();
        if properties.frames_per_second <= 0.0 {
            return Err(SubgridError::InvalidConfiguration(format!(
                "cannot determine frame rate of {}",
                self.video.display()
            )));
        }

        let write_path = if self.codec.needs_post_processing() {
            intermediate_path(&self.output)
        } else {
            self.output.clone()
        };
        if !self.overwrite {
            refuse_existing(&self.output)?;
            refuse_existing(&write_path)?;
        }
        let mut writer = VideoWriter::create(
            &write_path,
            properties.width,
            properties.height,
            properties.frames_per_second,
            self.codec.writer_codec(),
        )?;

        let total = (properties.frame_count > 0).then_some(properties.frame_count);
        let mut tracker = ProgressTracker::new(
            self.progress.clone(),
            OperationType::Embedding,
            total,
            self.batch_size,
        );
        let report = run_embed(
            &mut reader,
            &mut writer,
            &timeline,
            &self.options,
            self.debug_overlay,
            &mut tracker,
        )?;
        drop(writer);
        drop(reader);

        let output = if self.codec.needs_post_processing() {
            let mut tracker =
                ProgressTracker::new(self.progress.clone(), OperationType::Transcoding, Some(1), 1);
            let output = finalize_output(
                &write_path,
                &self.output,
                self.post_processor.as_ref(),
                self.overwrite,
            )?;
            tracker.advance();
            output
        } else {
            FinalOutput {
                path: self.output,
                transcoded: false,
            }
        };

        Ok(EmbedOutcome { report, output })
    }
}

fn refuse_existing(path: &Path) -> Result<(), SubgridError> {
    if path.exists() {
        return Err(SubgridError::OutputCreate {
            path: path.to_path_buf(),
            reason: "file already exists".to_string(),
        });
    }
    Ok(())
}

/// Reads the signal back out of a video file.
#[must_use]
pub struct SignalVerifier {
    input: PathBuf,
    options: SignalOptions,
    progress: Arc<dyn ProgressCallback>,
    batch_size: u64,
}

impl SignalVerifier {
    /// Verify the video at `input`.
    pub fn new<P: AsRef<Path>>(input: P) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            options: SignalOptions::new(),
            progress: Arc::new(NoOpProgress),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the signal options. They must match the ones used to embed.
    pub fn with_options(mut self, options: SignalOptions) -> Self {
        self.options = options;
        self
    }

    /// Report progress to `callback`.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Report progress every `batch_size` frames.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run the verification.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options or if the input cannot be
    /// opened.
    pub fn run(self) -> Result<VerifyReport, SubgridError> {
        self.options.validate()?;
        let mut reader = VideoReader::open(&self.input)?;
        let frame_count = reader.properties().frame_count;
        let mut tracker = ProgressTracker::new(
            self.progress.clone(),
            OperationType::Verification,
            (frame_count > 0).then_some(frame_count),
            self.batch_size,
        );
        run_verify(&mut reader, &self.options, &mut tracker)
    }
}
