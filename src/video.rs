//! Frame sources and sinks.
//!
//! The pipeline reads frames from a [`FrameSource`] and writes them to a
//! [`FrameSink`]. [`VideoReader`] is the FFmpeg-backed source; the
//! FFmpeg-backed sink is [`VideoWriter`](crate::VideoWriter). Tests and
//! other callers can plug in their own implementations, such as frames held
//! in memory.
//!
//! # Example
//!
//! ```no_run
//! use subgrid::{FrameSource, VideoReader};
//!
//! let mut reader = VideoReader::open("input.mp4")?;
//! let properties = reader.properties();
//! println!("{}x{} @ {:.2} fps", properties.width, properties.height, properties.frames_per_second);
//!
//! while let Some(frame) = reader.read_frame()? {
//!     assert_eq!(frame.width(), properties.width);
//! }
//! # Ok::<(), subgrid::SubgridError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::decoder::Video as VideoDecoder;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::log::Level;
use ffmpeg_next::{Error as FfmpegError, Packet};
use image::RgbImage;
use log::LevelFilter;

use crate::error::SubgridError;
use crate::utilities::frame_to_buffer;

/// Consecutive failed packet reads tolerated before the reader gives up.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 32;

/// Basic properties of a video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    /// Average frame rate.
    pub frames_per_second: f64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame count reported or estimated from the container (0 if unknown).
    pub frame_count: u64,
}

/// A sequential supplier of RGB frames.
pub trait FrameSource {
    /// Properties of the frames this source yields.
    fn properties(&self) -> VideoProperties;

    /// The next frame, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame cannot be read or decoded.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, SubgridError>;
}

/// A sequential consumer of RGB frames.
pub trait FrameSink {
    /// Append one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), SubgridError>;

    /// Flush buffered output. Called once after the last frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be finalized.
    fn finish(&mut self) -> Result<(), SubgridError>;
}

/// Decodes frames from a video file as RGB images.
pub struct VideoReader {
    path: PathBuf,
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    properties: VideoProperties,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    eof_sent: bool,
    done: bool,
    read_errors: ReadErrorCounter,
}

impl VideoReader {
    /// Open a video file and prepare its best video stream for decoding.
    ///
    /// # Errors
    ///
    /// - [`SubgridError::FileOpen`] if the file cannot be opened or its
    ///   decoder cannot be created.
    /// - [`SubgridError::NoVideoStream`] if the file has no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SubgridError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |reason: String| SubgridError::FileOpen {
            path: path.clone(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(SubgridError::NoVideoStream)?;
        let stream_index = stream.index();

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| open_error(format!("Failed to create video decoder: {error}")))?;

        let frames_per_second = rational_to_f64(stream.avg_frame_rate())
            .or_else(|| rational_to_f64(stream.rate()))
            .unwrap_or(0.0);

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else if input.duration() > 0 && frames_per_second > 0.0 {
            let duration = Duration::from_micros(input.duration() as u64);
            (duration.as_secs_f64() * frames_per_second) as u64
        } else {
            0
        };

        let properties = VideoProperties {
            frames_per_second,
            width: decoder.width(),
            height: decoder.height(),
            frame_count,
        };

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ScalingFlags::BILINEAR,
        )?;

        log::info!(
            "Opened {} ({}x{}, {:.3} fps, ~{} frames)",
            path.display(),
            properties.width,
            properties.height,
            properties.frames_per_second,
            properties.frame_count
        );

        Ok(Self {
            path,
            input,
            decoder,
            scaler,
            stream_index,
            properties,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            eof_sent: false,
            done: false,
            read_errors: ReadErrorCounter::new(MAX_CONSECUTIVE_READ_ERRORS),
        })
    }

    /// Path the reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn convert_current_frame(&mut self) -> Result<RgbImage, SubgridError> {
        self.scaler.run(&self.decoded_frame, &mut self.rgb_frame)?;

        let VideoProperties { width, height, .. } = self.properties;
        let buffer = frame_to_buffer(&self.rgb_frame, width, height, 3);
        RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            SubgridError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })
    }
}

impl FrameSource for VideoReader {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, SubgridError> {
        if self.done {
            return Ok(None);
        }

        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                return self.convert_current_frame().map(Some);
            }

            if self.eof_sent {
                self.done = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    self.read_errors.reset();
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    if let Err(fatal) = self.read_errors.record(&error) {
                        self.done = true;
                        return Err(fatal);
                    }
                }
            }
        }
    }
}

/// Counts consecutive demuxer failures so a broken input ends the read loop.
#[derive(Debug)]
struct ReadErrorCounter {
    limit: u32,
    consecutive: u32,
}

impl ReadErrorCounter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }

    fn record(&mut self, error: &FfmpegError) -> Result<(), SubgridError> {
        self.consecutive += 1;
        if self.consecutive >= self.limit {
            return Err(SubgridError::VideoDecodeError(format!(
                "giving up after {} consecutive read errors, last: {error}",
                self.consecutive
            )));
        }
        log::debug!("Skipping unreadable packet: {error}");
        Ok(())
    }
}

fn rational_to_f64(rational: ffmpeg_next::Rational) -> Option<f64> {
    (rational.denominator() != 0 && rational.numerator() > 0)
        .then(|| rational.numerator() as f64 / rational.denominator() as f64)
}

/// Set FFmpeg's own console verbosity to match a `log` level filter.
///
/// FFmpeg prints to stderr independently of the `log` facade. This keeps it
/// quiet at the default `info` level and lets it through when debugging.
pub fn set_ffmpeg_log_level(filter: LevelFilter) {
    let level = match filter {
        LevelFilter::Off => Level::Quiet,
        LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => Level::Error,
        LevelFilter::Debug => Level::Warning,
        LevelFilter::Trace => Level::Debug,
    };
    ffmpeg_next::util::log::set_level(level);
}
