//! # subgrid
//!
//! Embed subtitle text into video frames as a grid of luminance marks, and
//! read it back.
//!
//! Each frame carries one packet: a fixed number of single-byte character
//! codes serialized MSB-first onto a `rows x cols` grid. A 1 bit is a
//! semi-transparent disc drawn at the cell's midpoint; a 0 bit leaves the
//! cell untouched. Decoding samples the midpoint pixel's luminance against a
//! threshold. A per-frame state machine follows the subtitle timeline and
//! walks each subtitle's packets, repeated for redundancy, as soon as the
//! subtitle appears.
//!
//! Video I/O goes through FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate; the signal
//! itself works on plain [`image::RgbImage`] frames.
//!
//! ## Quick Start
//!
//! ### Embed subtitles into a video
//!
//! ```no_run
//! use subgrid::{OutputCodec, SubtitleEmbedder};
//!
//! let outcome = SubtitleEmbedder::new("input.mp4", "input.srt", "output.mkv")
//!     .with_codec(OutputCodec::Ffv1)
//!     .run()
//!     .unwrap();
//! println!("wrote {}", outcome.output.path.display());
//! ```
//!
//! ### Read the signal back
//!
//! ```no_run
//! use subgrid::SignalVerifier;
//!
//! let report = SignalVerifier::new("output.mkv").run().unwrap();
//! for transition in report.transitions {
//!     println!("frame {}: {}", transition.frame_number, transition.text);
//! }
//! ```
//!
//! ### Work on frames directly
//!
//! ```
//! use image::RgbImage;
//! use subgrid::{GridCodec, PacketEncoder, SignalOptions, bits_to_text};
//!
//! let options = SignalOptions::new();
//! let codec = GridCodec::new(&options, 640, 360).unwrap();
//! let encoder = PacketEncoder::from_options(&options).unwrap();
//!
//! let mut frame = RgbImage::new(640, 360);
//! codec.embed(&mut frame, &encoder.packet_to_matrix(&encoder.pack("HI")));
//! assert_eq!(bits_to_text(codec.decode(&frame).as_bits()), "HI");
//! ```
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build. The `ffmpeg`
//! executable is only needed for [`OutputCodec::H264`], which post-processes
//! a lossless intermediate.

pub mod codec;
pub mod configuration;
pub mod decoder;
pub mod encode;
pub mod error;
pub mod grid;
pub mod packet;
pub mod pipeline;
pub mod progress;
pub mod sequencer;
pub mod srt;
pub mod timeline;
pub mod transcode;
mod utilities;
pub mod video;

pub use codec::{GRID_LINE_COLOR, GridCodec};
pub use configuration::{Roi, RoiPolicy, SignalOptions, TransmissionMode};
pub use decoder::{SignalDecoder, TextTransition};
pub use encode::{VideoCodec, VideoWriter};
pub use error::SubgridError;
pub use grid::{BitMatrix, GridSpec};
pub use packet::{
    BitSequence, FALLBACK_CODE, Packet, PacketEncoder, PacketSequence, bits_to_text, text_to_codes,
};
pub use pipeline::{
    EmbedOutcome, EmbedReport, OutputCodec, SignalVerifier, SubtitleEmbedder, VerifyReport,
    embed_stream, verify_stream,
};
pub use progress::{NoOpProgress, OperationType, ProgressCallback, ProgressInfo};
pub use sequencer::{FrameSequencer, FrameSignal, SequencerState, SubtitlePlan, TransmissionPlan};
pub use srt::{load_srt, parse_srt};
pub use timeline::{SubtitleEntry, Timeline};
pub use transcode::{
    FfmpegTranscoder, FinalOutput, LOSSLESS_H264_ARGUMENTS, PostProcessor, finalize_output,
    intermediate_path,
};
pub use utilities::{frame_time_ms, frames_in_span};
pub use video::{FrameSink, FrameSource, VideoProperties, VideoReader, set_ffmpeg_log_level};
