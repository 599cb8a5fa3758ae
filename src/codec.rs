//! Grid codec: bits to pixels and back.
//!
//! [`GridCodec`] divides a region of interest (ROI) of the frame into
//! `rows x cols` cells. Embedding draws a filled disc in the "on" colour at
//! the midpoint of every cell whose bit is 1 and alpha-blends it over the
//! frame; cells whose bit is 0 are left untouched. Decoding samples the
//! luminance of the single midpoint pixel of each cell and compares it with
//! the threshold.
//!
//! # Example
//!
//! ```
//! use image::RgbImage;
//! use subgrid::{GridCodec, PacketEncoder, SignalOptions, bits_to_text};
//!
//! let options = SignalOptions::new();
//! let codec = GridCodec::new(&options, 320, 240)?;
//! let encoder = PacketEncoder::from_options(&options)?;
//!
//! let mut frame = RgbImage::new(320, 240);
//! codec.embed(&mut frame, &encoder.packet_to_matrix(&encoder.pack("Hello")));
//!
//! let decoded = codec.decode(&frame);
//! assert_eq!(bits_to_text(decoded.as_bits()), "Hello");
//! # Ok::<(), subgrid::SubgridError>(())
//! ```

use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::configuration::{Roi, SignalOptions};
use crate::error::SubgridError;
use crate::grid::{BitMatrix, GridSpec};
use crate::utilities::{blend_channel, luminance};

/// Colour of the debug cell-boundary overlay.
pub const GRID_LINE_COLOR: Rgb<u8> = Rgb([100, 100, 100]);

/// Bidirectional mapping between a [`BitMatrix`] and frame pixels.
///
/// A codec is built for one frame size; every frame passed to
/// [`embed`](GridCodec::embed) or [`decode`](GridCodec::decode) is expected
/// to have that size.
#[derive(Debug, Clone)]
pub struct GridCodec {
    grid: GridSpec,
    roi: Roi,
    cell_width: u32,
    cell_height: u32,
    radius: u32,
    on_color: Rgb<u8>,
    opacity: f32,
    threshold: u8,
}

impl GridCodec {
    /// Build a codec for frames of `frame_width x frame_height`.
    ///
    /// # Errors
    ///
    /// - [`SubgridError::InvalidGrid`] for an unusable grid shape.
    /// - [`SubgridError::FrameTooSmall`] if the ROI does not fit inside the
    ///   frame or a cell would be smaller than one pixel.
    pub fn new(
        options: &SignalOptions,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Self, SubgridError> {
        let grid = options.grid_spec()?;
        let roi = options.roi.resolve(frame_width, frame_height);

        let fits = roi.right() <= frame_width as u64
            && roi.bottom() <= frame_height as u64
            && roi.width >= grid.cols()
            && roi.height >= grid.rows();
        if !fits {
            let required_width = roi.x as u64 + roi.width.max(grid.cols()) as u64;
            let required_height = roi.y as u64 + roi.height.max(grid.rows()) as u64;
            return Err(SubgridError::FrameTooSmall {
                width: frame_width,
                height: frame_height,
                required_width: required_width.min(u32::MAX as u64) as u32,
                required_height: required_height.min(u32::MAX as u64) as u32,
            });
        }

        let cell_width = roi.width / grid.cols();
        let cell_height = roi.height / grid.rows();
        let radius = (cell_width.min(cell_height) as f32 * options.radius_fraction) as u32;

        log::debug!(
            "Grid codec: roi={:?}, cell={}x{}, radius={}",
            roi,
            cell_width,
            cell_height,
            radius
        );

        Ok(Self {
            grid,
            roi,
            cell_width,
            cell_height,
            radius,
            on_color: options.on_color,
            opacity: options.opacity,
            threshold: options.threshold,
        })
    }

    /// The grid shape this codec reads and writes.
    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// The resolved region of interest.
    pub fn roi(&self) -> Roi {
        self.roi
    }

    /// Cell size as `(width, height)` in pixels.
    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.cell_height)
    }

    /// Radius of a mark in pixels.
    pub fn mark_radius(&self) -> u32 {
        self.radius
    }

    /// Frame coordinates of the midpoint of cell `(row, col)`.
    pub fn cell_center(&self, row: u32, col: u32) -> (u32, u32) {
        let (x, y) = self.local_center(row, col);
        (self.roi.x + x, self.roi.y + y)
    }

    /// Draw the marks for `bits` onto `frame`.
    ///
    /// Marks are drawn on a scratch copy of the ROI and blended back as
    /// `round(α·marked + (1−α)·original)`; pixels no mark touches keep their
    /// exact value.
    pub fn embed(&self, frame: &mut RgbImage, bits: &BitMatrix) {
        debug_assert_eq!(bits.grid(), self.grid, "matrix shaped for another grid");
        if bits.is_blank() {
            return;
        }

        let roi = self.roi;
        let mut scratch =
            imageops::crop_imm(&*frame, roi.x, roi.y, roi.width, roi.height).to_image();
        for (row, col) in bits.ones() {
            let (x, y) = self.local_center(row, col);
            draw_filled_circle_mut(
                &mut scratch,
                (x as i32, y as i32),
                self.radius as i32,
                self.on_color,
            );
        }

        for (x, y, marked) in scratch.enumerate_pixels() {
            let original = frame.get_pixel_mut(roi.x + x, roi.y + y);
            if *marked == *original {
                continue;
            }
            let Rgb([mr, mg, mb]) = *marked;
            let Rgb([or, og, ob]) = *original;
            *original = Rgb([
                blend_channel(mr, or, self.opacity),
                blend_channel(mg, og, self.opacity),
                blend_channel(mb, ob, self.opacity),
            ]);
        }
    }

    /// Embed the all-zero matrix. Leaves the frame untouched.
    pub fn embed_empty(&self, frame: &mut RgbImage) {
        self.embed(frame, &BitMatrix::zeros(self.grid));
    }

    /// Recover the bit matrix from a frame.
    ///
    /// One pixel per cell is sampled at its midpoint; the bit is 1 only if
    /// the pixel's luminance is strictly greater than the threshold. A
    /// midpoint outside the frame reads as 0.
    pub fn decode(&self, frame: &RgbImage) -> BitMatrix {
        let mut matrix = BitMatrix::zeros(self.grid);
        for row in 0..self.grid.rows() {
            for col in 0..self.grid.cols() {
                let (x, y) = self.cell_center(row, col);
                let lit = frame
                    .get_pixel_checked(x, y)
                    .is_some_and(|&pixel| luminance(pixel) > self.threshold);
                if lit {
                    matrix.set(row, col, true);
                }
            }
        }
        matrix
    }

    /// Draw cell boundaries for visual debugging.
    ///
    /// The lines are not part of the signal and may corrupt decoding when
    /// they cross a cell midpoint on tiny grids.
    pub fn draw_grid_overlay(&self, frame: &mut RgbImage) {
        let left = self.roi.x as f32;
        let top = self.roi.y as f32;
        let right = (self.roi.x + self.grid.cols() * self.cell_width) as f32 - 1.0;
        let bottom = (self.roi.y + self.grid.rows() * self.cell_height) as f32 - 1.0;

        for col in 0..=self.grid.cols() {
            let x = (left + (col * self.cell_width) as f32).min(right);
            draw_line_segment_mut(frame, (x, top), (x, bottom), GRID_LINE_COLOR);
        }
        for row in 0..=self.grid.rows() {
            let y = (top + (row * self.cell_height) as f32).min(bottom);
            draw_line_segment_mut(frame, (left, y), (right, y), GRID_LINE_COLOR);
        }
    }

    fn local_center(&self, row: u32, col: u32) -> (u32, u32) {
        (
            col * self.cell_width + self.cell_width / 2,
            row * self.cell_height + self.cell_height / 2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::RoiPolicy;

    #[test]
    fn geometry_of_default_grid() {
        let codec = GridCodec::new(&SignalOptions::new(), 1280, 720).unwrap();
        assert_eq!(codec.cell_size(), (106, 60));
        assert_eq!(codec.mark_radius(), 12);
        assert_eq!(codec.cell_center(0, 0), (53, 30));
        assert_eq!(codec.cell_center(11, 11), (1219, 690));
    }

    #[test]
    fn rejects_frame_narrower_than_grid() {
        let result = GridCodec::new(&SignalOptions::new(), 8, 100);
        assert!(matches!(
            result,
            Err(SubgridError::FrameTooSmall {
                required_width: 12,
                ..
            })
        ));
    }

    #[test]
    fn rejects_roi_outside_frame() {
        let options =
            SignalOptions::new().with_roi(RoiPolicy::Fixed(Roi::new(50, 0, 100, 100)));
        assert!(GridCodec::new(&options, 120, 120).is_err());
        assert!(GridCodec::new(&options, 150, 120).is_ok());
    }

    #[test]
    fn one_pixel_cells_still_work() {
        let codec = GridCodec::new(&SignalOptions::new(), 12, 12).unwrap();
        assert_eq!(codec.mark_radius(), 0);
        let mut bits = BitMatrix::zeros(codec.grid());
        bits.set(3, 4, true);
        let mut frame = RgbImage::new(12, 12);
        codec.embed(&mut frame, &bits);
        assert_eq!(codec.decode(&frame), bits);
    }
}
