//! Image decoding into the RGB working image.
//!
//! Accepts raw encoded bytes (PNG, JPEG, BMP, WebP) or an uncompressed
//! RGB/RGBA pixel buffer and produces an [`RgbImage`]. Transparent
//! pixels are composited over opaque white, so a layer decomposition of
//! an icon with a transparent background sees a white background.
//!
//! This is the first step in the pipeline: raw input in, `RgbImage` out.

use image::{DynamicImage, RgbImage, Rgba};

use crate::types::PipelineError;

/// Decode raw image bytes into an RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
/// Returns [`PipelineError::EmptyImage`] if the decoded image has no
/// pixels.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(PipelineError::EmptyImage);
    }
    Ok(flatten(&img))
}

/// Build an RGB image from an uncompressed row-major pixel buffer.
///
/// `channels` must be 3 (RGB) or 4 (RGBA, composited over white).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyImage`] for a zero dimension,
/// [`PipelineError::UnsupportedChannels`] for any other channel count,
/// and [`PipelineError::BufferSize`] if `data` has the wrong length.
pub fn from_raw(
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
) -> Result<RgbImage, PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::EmptyImage);
    }
    if channels != 3 && channels != 4 {
        return Err(PipelineError::UnsupportedChannels(channels));
    }
    let expected = width as usize * height as usize * usize::from(channels);
    if data.len() != expected {
        return Err(PipelineError::BufferSize {
            expected,
            actual: data.len(),
        });
    }

    let buffer_size = || PipelineError::BufferSize {
        expected,
        actual: expected,
    };
    if channels == 3 {
        RgbImage::from_raw(width, height, data).ok_or_else(buffer_size)
    } else {
        let rgba = image::RgbaImage::from_raw(width, height, data).ok_or_else(buffer_size)?;
        Ok(flatten(&DynamicImage::ImageRgba8(rgba)))
    }
}

/// Validate an already-decoded image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyImage`] if the image has no pixels.
pub fn check_dimensions(image: &RgbImage) -> Result<(), PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::EmptyImage);
    }
    Ok(())
}

/// Resize to a `size x size` square with the Lanczos3 filter.
///
/// Returns the image unchanged (and `false`) when it already has the
/// requested size.
#[must_use]
pub fn resize_to_canonical(image: RgbImage, size: u32) -> (RgbImage, bool) {
    if image.width() == size && image.height() == size {
        return (image, false);
    }
    let resized =
        image::imageops::resize(&image, size, size, image::imageops::FilterType::Lanczos3);
    (resized, true)
}

/// Convert any decoded image to RGB, compositing alpha over white.
fn flatten(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        over_white(*rgba.get_pixel(x, y))
    })
}

/// Composite a single RGBA pixel over opaque white.
fn over_white(pixel: Rgba<u8>) -> image::Rgb<u8> {
    let [r, g, b, a] = pixel.0;
    let alpha = u32::from(a);
    let blend = |c: u8| {
        let value = (u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255;
        #[allow(clippy::cast_possible_truncation)]
        let value = value.min(255) as u8;
        value
    };
    image::Rgb([blend(r), blend(g), blend(b)])
}
