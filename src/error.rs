//! Error types for the `subgrid` crate.
//!
//! This module defines [`SubgridError`], the unified error type returned by
//! all fallible operations in the crate. Variants carry the paths, sizes, and
//! upstream messages needed to diagnose a failed run without extra logging at
//! the call site.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `subgrid` operations.
///
/// Malformed subtitle blocks and capacity overflow have no variant: the SRT
/// loader skips the former and packing truncates the latter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubgridError {
    /// The input video could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::VideoReader::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The output video could not be created.
    #[error("Failed to create output file at {path}: {reason}")]
    OutputCreate {
        /// Path of the output that could not be created.
        path: PathBuf,
        /// Underlying reason the creation failed.
        reason: String,
    },

    /// The input file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// The encoder could not be found, configured, or opened.
    #[error("Video encoding error: {0}")]
    VideoEncodeError(String),

    /// Writing an encoded frame or container structure failed.
    #[error("Video write error: {0}")]
    VideoWriteError(String),

    /// The grid shape cannot carry whole characters.
    #[error("Invalid grid {rows}x{cols}: rows and columns must be non-zero and rows*cols a multiple of 8")]
    InvalidGrid {
        /// Requested row count.
        rows: u32,
        /// Requested column count.
        cols: u32,
    },

    /// A bit sequence or matrix does not match the grid it is used with.
    #[error("Bit length mismatch: grid holds {expected} bits, got {actual}")]
    BitLengthMismatch {
        /// Number of bits the grid holds.
        expected: usize,
        /// Number of bits supplied.
        actual: usize,
    },

    /// The frame is too small to hold the grid's region of interest.
    #[error(
        "Frame {width}x{height} is too small for the signal grid (needs at least {required_width}x{required_height})"
    )]
    FrameTooSmall {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
        /// Minimum width that fits the region of interest.
        required_width: u32,
        /// Minimum height that fits the region of interest.
        required_height: u32,
    },

    /// A signal option is out of its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The external post-processing transcoder failed or is missing.
    #[error("Transcode error: {0}")]
    TranscodeError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

impl From<FfmpegError> for SubgridError {
    fn from(error: FfmpegError) -> Self {
        SubgridError::FfmpegError(error.to_string())
    }
}
