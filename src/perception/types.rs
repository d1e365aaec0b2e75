use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::{GroundError, GroundResult};

/// Pixel size of a screen, screenshot or perceived frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

/// A PNG-encoded screenshot together with its pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub size: SurfaceSize,
}

impl EncodedImage {
    /// Wrap encoded bytes, reading the pixel size from the image itself.
    pub fn from_bytes(bytes: Vec<u8>) -> GroundResult<Self> {
        let (width, height) = image::ImageReader::new(std::io::Cursor::new(&bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        let size = SurfaceSize::new(width, height);
        if size.is_degenerate() {
            return Err(GroundError::InvalidImage(format!("decoded image is {size}")));
        }
        Ok(Self { bytes, size })
    }

    pub fn from_base64(data: &str) -> GroundResult<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim())?;
        Self::from_bytes(bytes)
    }

    pub fn from_rgba(img: image::RgbaImage) -> GroundResult<Self> {
        let size = SurfaceSize::new(img.width(), img.height());
        if size.is_degenerate() {
            return Err(GroundError::InvalidImage(format!("captured image is {size}")));
        }
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(Self { bytes, size })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }

    /// Re-encode at a different pixel size. Returns a clone when the size already matches.
    pub fn resized(&self, target: SurfaceSize) -> GroundResult<Self> {
        if target == self.size {
            return Ok(self.clone());
        }
        if target.is_degenerate() {
            return Err(GroundError::InvalidImage(format!("cannot resize to {target}")));
        }
        let img = image::load_from_memory(&self.bytes)?;
        let resized = img.resize_exact(
            target.width,
            target.height,
            image::imageops::FilterType::Triangle,
        );
        Self::from_rgba(resized.to_rgba8())
    }
}

#[cfg(test)]
pub(crate) fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 40, 40, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
