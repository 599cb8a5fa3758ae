//! Internal utility functions.
//!
//! Helpers for pixel-data copying between FFmpeg frames and `image`
//! buffers, per-channel blending, luminance, and frame timing shared by the
//! encode and decode paths.

use ffmpeg_next::frame::Video as VideoFrame;
use image::{Pixel, Rgb, RgbImage};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is the number of bytes per pixel of the frame's format
/// (3 for RGB24).
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Copy an RGB image into the first plane of an RGB24 FFmpeg frame,
/// honouring the frame's stride.
pub(crate) fn image_to_frame(image: &RgbImage, video_frame: &mut VideoFrame) {
    let row_len = image.width() as usize * 3;
    let stride = video_frame.stride(0);
    let destination = video_frame.data_mut(0);
    for (row, source_row) in image.as_raw().chunks_exact(row_len).enumerate() {
        let start = row * stride;
        destination[start..start + row_len].copy_from_slice(source_row);
    }
}

/// Presentation time of a 0-based frame number, in whole milliseconds.
///
/// Truncates toward zero. Encode and decode sides both use this, so a frame
/// always maps to the same subtitle on either side.
pub fn frame_time_ms(frame_number: u64, frames_per_second: f64) -> u64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    (frame_number as f64 / frames_per_second * 1000.0) as u64
}

/// Number of frames whose presentation time falls in `[start_ms, end_ms]`.
pub fn frames_in_span(start_ms: u64, end_ms: u64, frames_per_second: f64) -> u64 {
    if frames_per_second <= 0.0 || end_ms < start_ms {
        return 0;
    }
    let first = first_frame_at_or_after(start_ms, frames_per_second);
    let last = first_frame_at_or_after(end_ms + 1, frames_per_second);
    last.saturating_sub(first)
}

fn first_frame_at_or_after(time_ms: u64, frames_per_second: f64) -> u64 {
    let mut frame = (time_ms as f64 * frames_per_second / 1000.0).floor() as u64;
    while frame_time_ms(frame, frames_per_second) < time_ms {
        frame += 1;
    }
    while frame > 0 && frame_time_ms(frame - 1, frames_per_second) >= time_ms {
        frame -= 1;
    }
    frame
}

/// Blend one channel: `round(alpha * marked + (1 - alpha) * original)`.
pub(crate) fn blend_channel(marked: u8, original: u8, alpha: f32) -> u8 {
    let value = alpha * marked as f32 + (1.0 - alpha) * original as f32;
    value.round().clamp(0.0, 255.0) as u8
}

/// 8-bit luminance of an RGB pixel.
pub(crate) fn luminance(pixel: Rgb<u8>) -> u8 {
    pixel.to_luma().0[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_time_truncates() {
        assert_eq!(frame_time_ms(0, 25.0), 0);
        assert_eq!(frame_time_ms(1, 30.0), 33);
        assert_eq!(frame_time_ms(30, 30.0), 1000);
        assert_eq!(frame_time_ms(10, 0.0), 0);
    }

    #[test]
    fn frames_in_inclusive_span() {
        // At 10 fps frames land on 0, 100, 200, ... ms.
        assert_eq!(frames_in_span(1000, 2000, 10.0), 11);
        assert_eq!(frames_in_span(1001, 1099, 10.0), 0);
        assert_eq!(frames_in_span(1000, 1000, 10.0), 1);
    }

    #[test]
    fn blend_is_identity_on_equal_inputs() {
        for value in [0u8, 1, 127, 128, 200, 255] {
            assert_eq!(blend_channel(value, value, 0.7), value);
        }
    }

    #[test]
    fn gray_luminance_is_exact() {
        assert_eq!(luminance(Rgb([179, 179, 179])), 179);
        assert_eq!(luminance(Rgb([0, 0, 0])), 0);
    }
}
