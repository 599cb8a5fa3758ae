//! Streaming video writer.
//!
//! [`VideoWriter`] encodes RGB frames one at a time into a container whose
//! format is inferred from the file extension. It implements
//! [`FrameSink`], so the embedding loop never holds more than one frame.
//!
//! # Example
//!
//! ```no_run
//! use image::RgbImage;
//! use subgrid::{FrameSink, VideoCodec, VideoWriter};
//!
//! let mut writer = VideoWriter::create("output.mkv", 320, 240, 25.0, VideoCodec::Ffv1)?;
//! for _ in 0..25 {
//!     writer.write_frame(&RgbImage::new(320, 240))?;
//! }
//! writer.finish()?;
//! # Ok::<(), subgrid::SubgridError>(())
//! ```

use std::path::{Path, PathBuf};

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::encoder::video::Encoder as VideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Packet, Rational};
use image::RgbImage;

use crate::error::SubgridError;
use crate::utilities::image_to_frame;
use crate::video::FrameSink;

/// Target bit rate per pixel per frame for the lossy codecs. High enough
/// that single-pixel luminance samples survive compression.
const BITS_PER_PIXEL: f64 = 1.5;

/// Codecs the writer can encode with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// MPEG-4 Part 2.
    Mpeg4,
    /// Motion JPEG.
    Mjpeg,
    /// FFV1, lossless.
    Ffv1,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::Mpeg4 => Id::MPEG4,
            VideoCodec::Mjpeg => Id::MJPEG,
            VideoCodec::Ffv1 => Id::FFV1,
        }
    }

    fn input_pixel_format(self) -> Pixel {
        match self {
            VideoCodec::Mpeg4 => Pixel::YUV420P,
            VideoCodec::Mjpeg => Pixel::YUVJ420P,
            // Planar RGB keeps the round trip from RGB24 exact.
            VideoCodec::Ffv1 => Pixel::GBRP,
        }
    }

    /// Whether decoding the output returns the written pixels unchanged.
    pub fn is_lossless(self) -> bool {
        matches!(self, VideoCodec::Ffv1)
    }
}

/// Encodes frames into a video file as they arrive.
pub struct VideoWriter {
    path: PathBuf,
    output: Output,
    encoder: VideoEncoder,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    width: u32,
    height: u32,
    rgb_frame: VideoFrame,
    frames_written: u64,
    finished: bool,
}

impl VideoWriter {
    /// Create the output file and open an encoder for it.
    ///
    /// # Errors
    ///
    /// - [`SubgridError::OutputCreate`] if the output cannot be created.
    /// - [`SubgridError::VideoEncodeError`] if the codec is unavailable or
    ///   rejects the settings.
    /// - [`SubgridError::VideoWriteError`] if the header cannot be written.
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        frames_per_second: f64,
        codec: VideoCodec,
    ) -> Result<Self, SubgridError> {
        let path = path.as_ref().to_path_buf();
        log::info!(
            "Writing {} ({}x{}, {:.3} fps, codec={:?})",
            path.display(),
            width,
            height,
            frames_per_second,
            codec
        );

        let create_error = |reason: String| SubgridError::OutputCreate {
            path: path.clone(),
            reason,
        };

        if frames_per_second <= 0.0 || !frames_per_second.is_finite() {
            return Err(create_error(format!(
                "invalid frame rate {frames_per_second}"
            )));
        }

        ffmpeg_next::init()
            .map_err(|error| create_error(format!("FFmpeg initialisation failed: {error}")))?;

        let mut output =
            ffmpeg_next::format::output(&path).map_err(|error| create_error(error.to_string()))?;

        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let codec_id = codec.to_codec_id();
        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            SubgridError::VideoEncodeError(format!("codec {codec_id:?} not available"))
        })?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|error| create_error(format!("cannot add stream: {error}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.encoder().video())
            .map_err(|error| {
                SubgridError::VideoEncodeError(format!("cannot create video encoder: {error}"))
            })?;

        let frame_rate = Rational::from(frames_per_second);
        let time_base = frame_rate.invert();
        let target_pixel = codec.input_pixel_format();

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(target_pixel);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));
        if !codec.is_lossless() {
            let bit_rate = width as f64 * height as f64 * frames_per_second * BITS_PER_PIXEL;
            encoder.set_bit_rate(bit_rate as usize);
        }

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder.open_as(encoder_codec).map_err(|error| {
            SubgridError::VideoEncodeError(format!("cannot open encoder: {error}"))
        })?;
        stream.set_parameters(&encoder);

        output.write_header().map_err(|error| {
            SubgridError::VideoWriteError(format!("cannot write header: {error}"))
        })?;

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            target_pixel,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| SubgridError::VideoWriteError(format!("cannot create scaler: {error}")))?;

        Ok(Self {
            path,
            output,
            encoder,
            scaler,
            stream_index,
            time_base,
            width,
            height,
            rgb_frame: VideoFrame::new(Pixel::RGB24, width, height),
            frames_written: 0,
            finished: false,
        })
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames accepted so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn write_pending_packets(&mut self) -> Result<(), SubgridError> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| SubgridError::VideoWriteError("output stream vanished".to_string()))?;

        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.time_base, stream_time_base);
            packet.write_interleaved(&mut self.output).map_err(|error| {
                SubgridError::VideoWriteError(format!("write packet failed: {error}"))
            })?;
        }
        Ok(())
    }
}

impl FrameSink for VideoWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), SubgridError> {
        if self.finished {
            return Err(SubgridError::VideoWriteError(
                "writer already finished".to_string(),
            ));
        }
        if frame.dimensions() != (self.width, self.height) {
            return Err(SubgridError::VideoWriteError(format!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        image_to_frame(frame, &mut self.rgb_frame);

        let mut converted = VideoFrame::empty();
        self.scaler
            .run(&self.rgb_frame, &mut converted)
            .map_err(|error| SubgridError::VideoWriteError(format!("scaling failed: {error}")))?;
        converted.set_pts(Some(self.frames_written as i64));

        self.encoder.send_frame(&converted).map_err(|error| {
            SubgridError::VideoEncodeError(format!("send_frame failed: {error}"))
        })?;
        self.frames_written += 1;

        self.write_pending_packets()
    }

    fn finish(&mut self) -> Result<(), SubgridError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder.send_eof().map_err(|error| {
            SubgridError::VideoEncodeError(format!("send_eof failed: {error}"))
        })?;
        self.write_pending_packets()?;

        self.output.write_trailer().map_err(|error| {
            SubgridError::VideoWriteError(format!("cannot write trailer: {error}"))
        })?;

        log::info!(
            "Wrote {} frames to {}",
            self.frames_written,
            self.path.display()
        );
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(error) = self.finish() {
                log::warn!("Failed to finalize {}: {error}", self.path.display());
            }
        }
    }
}
