//! Signal recovery for verification.
//!
//! [`SignalDecoder`] samples every Nth frame, reads the grid back with a
//! [`GridCodec`], rebuilds the text, and reports a [`TextTransition`]
//! whenever the recovered text is non-empty and differs from the last one
//! reported.
//!
//! With a majority window of `W > 1`, each bit is voted over the last `W`
//! sampled frames before the text is rebuilt; a bit is set only when it was
//! set in more than half of them.

use std::collections::VecDeque;

use image::RgbImage;

use crate::codec::GridCodec;
use crate::configuration::SignalOptions;
use crate::error::SubgridError;
use crate::grid::BitMatrix;
use crate::packet::bits_to_text;
use crate::utilities::frame_time_ms;

/// A change in the recovered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTransition {
    /// 0-based number of the frame the new text was read from.
    pub frame_number: u64,
    /// Presentation time of that frame in milliseconds.
    pub time_ms: u64,
    /// The recovered text.
    pub text: String,
}

/// Stateful reader of the embedded signal.
#[derive(Debug, Clone)]
pub struct SignalDecoder {
    codec: GridCodec,
    interval: u64,
    window: usize,
    frames_per_second: f64,
    recent: VecDeque<BitMatrix>,
    last_text: String,
}

impl SignalDecoder {
    /// Create a decoder for frames of the given size and rate.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::InvalidConfiguration`] for a zero sampling
    /// interval or majority window, or whatever [`GridCodec::new`] rejects.
    pub fn new(
        options: &SignalOptions,
        width: u32,
        height: u32,
        frames_per_second: f64,
    ) -> Result<Self, SubgridError> {
        if options.decode_interval == 0 {
            return Err(SubgridError::InvalidConfiguration(
                "decode interval must be at least 1".to_string(),
            ));
        }
        if options.majority_window == 0 {
            return Err(SubgridError::InvalidConfiguration(
                "majority window must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            codec: GridCodec::new(options, width, height)?,
            interval: options.decode_interval,
            window: options.majority_window,
            frames_per_second,
            recent: VecDeque::with_capacity(options.majority_window),
            last_text: String::new(),
        })
    }

    /// The codec used to read frames.
    pub fn codec(&self) -> &GridCodec {
        &self.codec
    }

    /// Whether `frame_number` is one of the sampled frames.
    pub fn samples(&self, frame_number: u64) -> bool {
        frame_number % self.interval == 0
    }

    /// Read the text from one frame without touching decoder state.
    pub fn read_text(&self, frame: &RgbImage) -> String {
        bits_to_text(self.codec.decode(frame).as_bits())
    }

    /// Feed one frame. Returns a transition when this frame is sampled and
    /// its text is non-empty and new.
    pub fn observe(&mut self, frame_number: u64, frame: &RgbImage) -> Option<TextTransition> {
        if !self.samples(frame_number) {
            return None;
        }

        let matrix = self.codec.decode(frame);
        let text = if self.window > 1 {
            if self.recent.len() == self.window {
                self.recent.pop_front();
            }
            self.recent.push_back(matrix);
            bits_to_text(majority_vote(&self.recent).as_bits())
        } else {
            bits_to_text(matrix.as_bits())
        };

        if text.is_empty() || text == self.last_text {
            return None;
        }

        self.last_text.clone_from(&text);
        let time_ms = frame_time_ms(frame_number, self.frames_per_second);
        log::debug!("Frame {frame_number} ({time_ms} ms): {text:?}");
        Some(TextTransition {
            frame_number,
            time_ms,
            text,
        })
    }

    /// The most recently reported text, or `""`.
    pub fn last_text(&self) -> &str {
        &self.last_text
    }
}

/// Set each bit that is set in more than half of `matrices`.
///
/// Returns an all-zero matrix of the default grid for an empty window.
fn majority_vote(matrices: &VecDeque<BitMatrix>) -> BitMatrix {
    let Some(first) = matrices.front() else {
        return BitMatrix::zeros(Default::default());
    };

    let grid = first.grid();
    let mut votes = vec![0usize; grid.capacity_bits()];
    for matrix in matrices {
        for (count, &bit) in votes.iter_mut().zip(matrix.as_bits()) {
            *count += usize::from(bit);
        }
    }

    let mut result = BitMatrix::zeros(grid);
    for (index, &count) in votes.iter().enumerate() {
        if count * 2 > matrices.len() {
            let index = index as u32;
            result.set(index / grid.cols(), index % grid.cols(), true);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSpec;

    fn matrix_with(bits: &[(u32, u32)]) -> BitMatrix {
        let mut matrix = BitMatrix::zeros(GridSpec::default());
        for &(row, col) in bits {
            matrix.set(row, col, true);
        }
        matrix
    }

    #[test]
    fn vote_needs_strict_majority() {
        let window: VecDeque<BitMatrix> = [
            matrix_with(&[(0, 0), (0, 1)]),
            matrix_with(&[(0, 0)]),
            matrix_with(&[(0, 1), (5, 5)]),
            matrix_with(&[(0, 0)]),
        ]
        .into();
        let voted = majority_vote(&window);
        assert!(voted.get(0, 0));
        assert!(!voted.get(0, 1));
        assert!(!voted.get(5, 5));
    }

    #[test]
    fn skips_unsampled_frames() {
        let mut decoder = SignalDecoder::new(&SignalOptions::new(), 120, 120, 25.0).unwrap();
        let frame = RgbImage::from_pixel(120, 120, image::Rgb([255, 255, 255]));
        assert!(decoder.observe(3, &frame).is_none());
        assert!(decoder.samples(20));
    }

    #[test]
    fn rejects_zero_interval() {
        let options = SignalOptions::new().with_decode_interval(0);
        assert!(SignalDecoder::new(&options, 120, 120, 25.0).is_err());
    }
}
