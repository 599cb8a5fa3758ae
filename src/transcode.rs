//! External post-processing.
//!
//! Some output codecs are produced in two steps: the embedder writes a
//! lossless intermediate file, then a [`PostProcessor`] turns it into the
//! requested output. [`FfmpegTranscoder`] does this with the `ffmpeg`
//! executable. When post-processing fails, [`finalize_output`] keeps the
//! intermediate as the result instead of failing the run. Existing files
//! are only replaced when the caller asks for it.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use subgrid::{FfmpegTranscoder, finalize_output};
//!
//! let result = finalize_output(
//!     Path::new("movie_temp.mkv"),
//!     Path::new("movie.mp4"),
//!     &FfmpegTranscoder::new(),
//!     false,
//! )?;
//! if !result.transcoded {
//!     eprintln!("kept lossless intermediate at {}", result.path.display());
//! }
//! # Ok::<(), subgrid::SubgridError>(())
//! ```

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::SubgridError;

/// Arguments giving lossless H.264 in a widely playable container.
pub const LOSSLESS_H264_ARGUMENTS: &[&str] = &[
    "-c:v",
    "libx264",
    "-preset",
    "veryslow",
    "-qp",
    "0",
    "-pix_fmt",
    "yuv444p",
];

/// Converts an intermediate file into the final output.
pub trait PostProcessor {
    /// Read `input` and write `output`.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::TranscodeError`] if the conversion fails.
    fn process(&self, input: &Path, output: &Path) -> Result<(), SubgridError>;
}

/// Runs the `ffmpeg` executable as a post-processor.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: OsString,
    arguments: Vec<String>,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    /// Lossless H.264 transcoding with `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: OsString::from("ffmpeg"),
            arguments: LOSSLESS_H264_ARGUMENTS
                .iter()
                .map(|argument| argument.to_string())
                .collect(),
        }
    }

    /// Use a different executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the encoding arguments placed between input and output.
    #[must_use]
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// The encoding arguments.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

impl PostProcessor for FfmpegTranscoder {
    fn process(&self, input: &Path, output: &Path) -> Result<(), SubgridError> {
        log::info!(
            "Transcoding {} -> {} with {}",
            input.display(),
            output.display(),
            self.program.to_string_lossy()
        );
        log::debug!("Transcoder arguments: {:?}", self.arguments);

        let result = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(&self.arguments)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|error| match error.kind() {
                ErrorKind::NotFound => SubgridError::TranscodeError(format!(
                    "{} not found; is FFmpeg installed?",
                    self.program.to_string_lossy()
                )),
                _ => SubgridError::TranscodeError(format!("failed to start transcoder: {error}")),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(SubgridError::TranscodeError(format!(
                "transcoder exited with {}: {}",
                result.status,
                tail.join(" | ")
            )));
        }

        Ok(())
    }
}

/// Where the result of a two-step write ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalOutput {
    /// Path of the file the caller should use.
    pub path: PathBuf,
    /// `true` if a post-processor produced `path`; `false` if the file was
    /// written directly or post-processing failed and the intermediate was
    /// kept.
    pub transcoded: bool,
}

/// Path of the lossless intermediate written before post-processing
/// `output`: `<stem>_temp.mkv` in the same directory.
pub fn intermediate_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{stem}_temp.mkv"))
}

/// Post-process `intermediate` into `output`.
///
/// On success the intermediate is deleted. On failure a warning is logged,
/// any partial `output` is removed, and the intermediate is moved next to
/// `output` under the output's stem with its own container extension.
/// If a file already sits at that fallback path and `overwrite` is `false`,
/// the intermediate stays where it is and becomes the result.
///
/// # Errors
///
/// Returns [`SubgridError::IoError`] only if the intermediate cannot be
/// moved into place after a post-processing failure.
pub fn finalize_output(
    intermediate: &Path,
    output: &Path,
    processor: &dyn PostProcessor,
    overwrite: bool,
) -> Result<FinalOutput, SubgridError> {
    match processor.process(intermediate, output) {
        Ok(()) => {
            if let Err(error) = fs::remove_file(intermediate) {
                log::warn!(
                    "Could not remove intermediate {}: {error}",
                    intermediate.display()
                );
            }
            Ok(FinalOutput {
                path: output.to_path_buf(),
                transcoded: true,
            })
        }
        Err(error) => {
            let fallback = fallback_path(intermediate, output, overwrite);
            log::warn!(
                "Post-processing failed ({error}); keeping intermediate output as {}",
                fallback.display()
            );

            if fallback != output && output.exists() {
                log::debug!("Removing partial output {}", output.display());
                fs::remove_file(output)?;
            }
            move_file(intermediate, &fallback)?;

            Ok(FinalOutput {
                path: fallback,
                transcoded: false,
            })
        }
    }
}

/// `output` with the intermediate's extension, unless that would replace a
/// file the run did not write.
fn fallback_path(intermediate: &Path, output: &Path, overwrite: bool) -> PathBuf {
    let extension = intermediate.extension().unwrap_or(OsStr::new("mkv"));
    let fallback = output.with_extension(extension);
    if fallback == intermediate || overwrite || !fallback.exists() {
        return fallback;
    }
    log::warn!(
        "{} already exists; leaving the intermediate in place",
        fallback.display()
    );
    intermediate.to_path_buf()
}

fn move_file(from: &Path, to: &Path) -> Result<(), SubgridError> {
    if from == to {
        return Ok(());
    }
    if fs::rename(from, to).is_err() {
        // Rename fails across filesystems.
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
