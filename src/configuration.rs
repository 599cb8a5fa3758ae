//! Signal configuration.
//!
//! [`SignalOptions`] bundles every tunable of the signal protocol: grid
//! shape, redundancy, mark appearance, decode threshold, and where on the
//! frame the grid lives. One value is threaded through the
//! [`GridCodec`](crate::GridCodec), [`PacketEncoder`](crate::PacketEncoder),
//! [`FrameSequencer`](crate::FrameSequencer), and
//! [`SignalDecoder`](crate::SignalDecoder) constructors; encode and decode
//! sides must agree on it.
//!
//! # Example
//!
//! ```
//! use subgrid::{RoiPolicy, SignalOptions};
//!
//! let options = SignalOptions::new()
//!     .with_grid(8, 16)
//!     .with_repetition(6)
//!     .with_opacity(0.8)
//!     .with_roi(RoiPolicy::Centered {
//!         width_fraction: 0.5,
//!         height_fraction: 0.5,
//!     });
//! options.validate()?;
//! # Ok::<(), subgrid::SubgridError>(())
//! ```

use image::Rgb;

use crate::error::SubgridError;
use crate::grid::GridSpec;
use crate::utilities::{blend_channel, luminance};

/// Default number of grid rows.
pub const DEFAULT_ROWS: u32 = 12;
/// Default number of grid columns.
pub const DEFAULT_COLS: u32 = 12;
/// Default number of consecutive frames each packet is repeated for.
pub const DEFAULT_REPETITION: usize = 4;
/// Default mark colour (white).
pub const DEFAULT_ON_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
/// Default overlay opacity.
pub const DEFAULT_OPACITY: f32 = 0.7;
/// Default decode luminance threshold on an 8-bit scale.
pub const DEFAULT_THRESHOLD: u8 = 128;
/// Default mark radius as a fraction of the smaller cell side.
pub const DEFAULT_RADIUS_FRACTION: f32 = 0.20;
/// Default decode sampling interval, in frames.
pub const DEFAULT_DECODE_INTERVAL: u64 = 10;

/// A rectangle of frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Roi {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Roi {
    /// Create a region from its position and size.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the rightmost column.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// One past the bottom row.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }
}

/// Where on the frame the signal grid is placed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RoiPolicy {
    /// The grid spans the whole frame. This is the default.
    #[default]
    FullFrame,
    /// The grid occupies a fixed pixel rectangle.
    Fixed(Roi),
    /// The grid occupies a centred rectangle sized as a fraction of the
    /// frame on each axis.
    Centered {
        /// Fraction of the frame width, in `(0, 1]`.
        width_fraction: f32,
        /// Fraction of the frame height, in `(0, 1]`.
        height_fraction: f32,
    },
}

impl RoiPolicy {
    /// Resolve the policy to a concrete rectangle for a frame size.
    ///
    /// The result is not checked against the frame; see
    /// [`GridCodec::new`](crate::GridCodec::new).
    pub fn resolve(&self, frame_width: u32, frame_height: u32) -> Roi {
        match *self {
            RoiPolicy::FullFrame => Roi::new(0, 0, frame_width, frame_height),
            RoiPolicy::Fixed(roi) => roi,
            RoiPolicy::Centered {
                width_fraction,
                height_fraction,
            } => {
                let width = (frame_width as f32 * width_fraction).floor() as u32;
                let height = (frame_height as f32 * height_fraction).floor() as u32;
                let width = width.min(frame_width);
                let height = height.min(frame_height);
                Roi::new(
                    (frame_width - width) / 2,
                    (frame_height - height) / 2,
                    width,
                    height,
                )
            }
        }
    }
}

/// What the sequencer transmits while a subtitle is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    /// Walk the repetition-expanded packet sequence once, one packet per
    /// frame, then fall silent until the subtitle changes. This is the
    /// default.
    #[default]
    Sequenced,
    /// Embed the subtitle's first packet (text truncated to capacity) on
    /// every frame the subtitle is active.
    Continuous,
}

/// Every tunable of the signal protocol.
#[derive(Debug, Clone)]
#[must_use]
pub struct SignalOptions {
    /// Grid rows.
    pub rows: u32,
    /// Grid columns.
    pub cols: u32,
    /// Consecutive frames each packet is repeated for.
    pub repetition: usize,
    /// Colour of a mark for a 1 bit.
    pub on_color: Rgb<u8>,
    /// Overlay opacity `α`: `output = α·marked + (1−α)·original`.
    pub opacity: f32,
    /// A sampled luminance strictly above this decodes as 1.
    pub threshold: u8,
    /// Mark radius as a fraction of `min(cell_width, cell_height)`.
    pub radius_fraction: f32,
    /// Placement of the grid on the frame.
    pub roi: RoiPolicy,
    /// Sequencing behaviour while a subtitle is active.
    pub mode: TransmissionMode,
    /// Decode every Nth frame.
    pub decode_interval: u64,
    /// Majority-vote bits over this many sampled frames (1 disables voting).
    pub majority_window: usize,
}

impl Default for SignalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalOptions {
    /// Options with every default applied: a 12x12 full-frame grid, 4x
    /// repetition, white marks at 70% opacity, threshold 128.
    pub fn new() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            repetition: DEFAULT_REPETITION,
            on_color: DEFAULT_ON_COLOR,
            opacity: DEFAULT_OPACITY,
            threshold: DEFAULT_THRESHOLD,
            radius_fraction: DEFAULT_RADIUS_FRACTION,
            roi: RoiPolicy::FullFrame,
            mode: TransmissionMode::Sequenced,
            decode_interval: DEFAULT_DECODE_INTERVAL,
            majority_window: 1,
        }
    }

    /// Set the grid shape.
    pub fn with_grid(mut self, rows: u32, cols: u32) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    /// Set the packet repetition count.
    pub fn with_repetition(mut self, repetition: usize) -> Self {
        self.repetition = repetition;
        self
    }

    /// Set the mark colour.
    pub fn with_on_color(mut self, color: Rgb<u8>) -> Self {
        self.on_color = color;
        self
    }

    /// Set the overlay opacity.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Set the decode luminance threshold.
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the mark radius fraction.
    pub fn with_radius_fraction(mut self, fraction: f32) -> Self {
        self.radius_fraction = fraction;
        self
    }

    /// Set the grid placement policy.
    pub fn with_roi(mut self, roi: RoiPolicy) -> Self {
        self.roi = roi;
        self
    }

    /// Set the transmission mode.
    pub fn with_mode(mut self, mode: TransmissionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the decode sampling interval.
    pub fn with_decode_interval(mut self, interval: u64) -> Self {
        self.decode_interval = interval;
        self
    }

    /// Set the majority-vote window used when decoding.
    ///
    /// The vote runs over consecutive *sampled* frames, so it only sees
    /// copies of the same packet when the decode interval does not exceed
    /// the repetition count. [`validate`](Self::validate) rejects a window
    /// above 1 otherwise.
    pub fn with_majority_window(mut self, window: usize) -> Self {
        self.majority_window = window;
        self
    }

    /// The grid shape these options describe.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::InvalidGrid`] for an unusable shape.
    pub fn grid_spec(&self) -> Result<GridSpec, SubgridError> {
        GridSpec::new(self.rows, self.cols)
    }

    /// Luminance of a mark's centre when drawn on a black frame.
    ///
    /// Decoding a blank frame only works if this exceeds the threshold.
    pub fn blank_mark_luminance(&self) -> u8 {
        let Rgb([red, green, blue]) = self.on_color;
        let blended = Rgb([
            blend_channel(red, 0, self.opacity),
            blend_channel(green, 0, self.opacity),
            blend_channel(blue, 0, self.opacity),
        ]);
        luminance(blended)
    }

    /// Check every option against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::InvalidGrid`] for a bad grid shape and
    /// [`SubgridError::InvalidConfiguration`] for anything else out of range.
    pub fn validate(&self) -> Result<(), SubgridError> {
        self.grid_spec()?;

        if self.repetition == 0 {
            return Err(invalid("repetition must be at least 1"));
        }
        if !(self.opacity > 0.0 && self.opacity <= 1.0) {
            return Err(invalid(format!(
                "opacity must be in (0, 1], got {}",
                self.opacity
            )));
        }
        if !(self.radius_fraction > 0.0 && self.radius_fraction <= 0.5) {
            return Err(invalid(format!(
                "radius fraction must be in (0, 0.5], got {}",
                self.radius_fraction
            )));
        }
        match self.roi {
            RoiPolicy::FullFrame => {}
            RoiPolicy::Fixed(roi) => {
                if roi.width == 0 || roi.height == 0 {
                    return Err(invalid("fixed ROI must have a non-zero size"));
                }
            }
            RoiPolicy::Centered {
                width_fraction,
                height_fraction,
            } => {
                let in_range = |fraction: f32| fraction > 0.0 && fraction <= 1.0;
                if !in_range(width_fraction) || !in_range(height_fraction) {
                    return Err(invalid(format!(
                        "centered ROI fractions must be in (0, 1], got {width_fraction}x{height_fraction}"
                    )));
                }
            }
        }
        if self.decode_interval == 0 {
            return Err(invalid("decode interval must be at least 1"));
        }
        if self.majority_window == 0 {
            return Err(invalid("majority window must be at least 1"));
        }
        if self.majority_window > 1 && self.decode_interval > self.repetition as u64 {
            return Err(invalid(format!(
                "majority window needs a decode interval of at most {} (the repetition), got {}",
                self.repetition, self.decode_interval
            )));
        }

        let mark = self.blank_mark_luminance();
        if mark <= self.threshold {
            return Err(invalid(format!(
                "mark luminance {mark} on a black frame does not exceed threshold {}",
                self.threshold
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SubgridError {
    SubgridError::InvalidConfiguration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_roi_is_centred() {
        let roi = RoiPolicy::Centered {
            width_fraction: 0.5,
            height_fraction: 0.25,
        }
        .resolve(640, 480);
        assert_eq!(roi, Roi::new(160, 180, 320, 120));
    }

    #[test]
    fn full_frame_roi() {
        assert_eq!(
            RoiPolicy::FullFrame.resolve(320, 240),
            Roi::new(0, 0, 320, 240)
        );
    }

    #[test]
    fn default_mark_clears_threshold() {
        let options = SignalOptions::new();
        assert_eq!(options.blank_mark_luminance(), 179);
        assert!(options.validate().is_ok());
    }
}
