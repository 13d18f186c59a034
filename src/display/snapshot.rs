//! PNG snapshots of the frame buffer.

use super::rgb_panel::{Pixel, color};
use embedded_graphics::pixelcolor::RgbColor;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Display not initialized")]
    NotReady,

    #[error("Frame buffer holds {actual} pixels, expected {expected}")]
    Size { expected: usize, actual: usize },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Convert an RGB565 frame to an RGB888 image
pub fn to_image(pixels: &[Pixel], width: u16, height: u16) -> Result<RgbImage, SnapshotError> {
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
        return Err(SnapshotError::Size {
            expected,
            actual: pixels.len(),
        });
    }

    let mut img = RgbImage::new(width as u32, height as u32);
    for (out, &pixel) in img.pixels_mut().zip(pixels) {
        let rgb = color::to_rgb888(pixel);
        *out = image::Rgb([rgb.r(), rgb.g(), rgb.b()]);
    }
    Ok(img)
}

pub fn save_png(pixels: &[Pixel], width: u16, height: u16, path: &Path) -> Result<(), SnapshotError> {
    to_image(pixels, width, height)?.save_with_format(path, image::ImageFormat::Png)?;
    tracing::info!("Saved frame buffer snapshot to {}", path.display());
    Ok(())
}
