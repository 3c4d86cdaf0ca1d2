//! In-process BC7/BC3 encoder built on `image_dds`. CPU only, always available.

use super::{CompressionBackend, Compressed, Device, QualityProfile};
use crate::config::TextureFormat;
use crate::error::BackendError;
use image::RgbaImage;
use image_dds::{ImageFormat, Mipmaps, Quality, SurfaceRgba8};
use std::borrow::Cow;

#[derive(Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }

    fn image_format(format: TextureFormat) -> ImageFormat {
        match format {
            TextureFormat::Bc7 => ImageFormat::BC7RgbaUnorm,
            TextureFormat::Bc3 => ImageFormat::BC3RgbaUnorm,
        }
    }
}

/// Multiply color channels by alpha, rounding to nearest
fn premultiply(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let alpha = pixel[3] as u16;
        for channel in &mut pixel.0[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
    out
}

impl CompressionBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn probe(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn compress(
        &self,
        image: &RgbaImage,
        profile: &QualityProfile,
        mipmaps: bool,
    ) -> Result<Compressed, BackendError> {
        let source: Cow<'_, RgbaImage> = if profile.premultiplied_alpha {
            Cow::Owned(premultiply(image))
        } else {
            Cow::Borrowed(image)
        };

        let mipmaps = if mipmaps {
            Mipmaps::GeneratedAutomatic
        } else {
            Mipmaps::Disabled
        };

        let surface = SurfaceRgba8::from_image(source.as_ref());
        let encoded = surface
            .encode(Self::image_format(profile.format), Quality::Normal, mipmaps)
            .map_err(|e| BackendError::Encode(e.to_string()))?;
        let dds = encoded
            .to_dds()
            .map_err(|e| BackendError::Encode(e.to_string()))?;

        let mut bytes = Vec::new();
        dds.write(&mut bytes)
            .map_err(|e| BackendError::Encode(e.to_string()))?;
        Ok(Compressed::new(bytes, Device::Cpu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_premultiply() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([255, 100, 0, 128]));
        let out = premultiply(&image);
        assert_eq!(out.get_pixel(0, 0), &Rgba([128, 50, 0, 128]));
    }

    #[test]
    fn test_encodes_dds() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([200, 30, 30, 255]));
        let backend = NativeBackend::new();
        assert!(backend.probe().is_ok());

        for format in [TextureFormat::Bc7, TextureFormat::Bc3] {
            let profile = QualityProfile {
                format,
                premultiplied_alpha: true,
            };
            let compressed = backend.compress(&image, &profile, false).unwrap();
            assert_eq!(&compressed.bytes[..4], b"DDS ");
            assert_eq!(compressed.device, Device::Cpu);
        }
    }
}
