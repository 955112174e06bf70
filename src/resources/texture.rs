//! Texture loading and upload

use crate::backend::traits::*;
use crate::backend::types::*;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Decoded RGBA8 pixel data
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, image::ImageError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)?;
        Ok(Self::from_image(&img, &name))
    }

    /// Load texture from encoded bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&img, name))
    }

    pub fn from_image(img: &DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Wrap raw RGBA8 bytes; `None` if the length does not match
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>, name: &str) -> Option<Self> {
        (data.len() == (width * height * 4) as usize).then(|| Self {
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            data,
            name: name.to_string(),
        })
    }

    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Flat tangent-space normal, encoded as (0.5, 0.5, 1.0)
    pub fn default_normal() -> Self {
        Self::solid_color([128, 128, 255, 255], "default_normal")
    }

    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: "checkerboard".to_string(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Create a sampled texture from this data
    pub fn upload<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<TextureHandle> {
        backend.create_texture(
            &TextureDescriptor {
                label: Some(self.name.clone()),
                width: self.width,
                height: self.height,
                format: self.format,
            },
            Some(&self.data),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    #[test]
    fn test_checkerboard_pattern() {
        let board = TextureData::checkerboard(16, [255, 0, 0, 255], [0, 0, 255, 255]);
        assert_eq!(board.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(board.pixel(8, 0), [0, 0, 255, 255]);
        assert_eq!(board.pixel(8, 8), [255, 0, 0, 255]);
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(TextureData::from_raw(2, 2, vec![0; 16], "ok").is_some());
        assert!(TextureData::from_raw(2, 2, vec![0; 15], "short").is_none());
    }

    #[test]
    fn test_png_roundtrip_through_image() {
        let img = image::RgbaImage::from_fn(4, 4, |x, y| image::Rgba([x as u8 * 60, y as u8 * 60, 7, 255]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();

        let texture = TextureData::from_bytes(&png, "grid").unwrap();
        assert_eq!((texture.width, texture.height), (4, 4));
        assert_eq!(texture.pixel(3, 2), [180, 120, 7, 255]);

        let mut backend = SoftwareBackend::new(4, 4);
        assert!(texture.upload(&mut backend).is_ok());
    }
}
