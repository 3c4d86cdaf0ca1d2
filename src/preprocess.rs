//! # Preprocessor
//!
//! Decodifica la texture e la prepara per il backend di compressione.
//!
//! ## Responsabilità:
//! - Decode completo del PNG in un buffer RGBA8
//! - Flip verticale (idempotente: il buffer ricorda se è già stato ribaltato)
//! - Upscale di un fattore intero con filtro Lanczos3
//!
//! ## Errori:
//! - Pixel corrotti -> `PreprocessError::Decode`
//! - Layout float (Rgb32F/Rgba32F) -> `PreprocessError::UnsupportedLayout`

use crate::config::RunConfig;
use crate::error::PreprocessError;
use crate::task::Task;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// RGBA8 buffer ready for compression
#[derive(Debug, Clone)]
pub struct PreparedImage {
    image: RgbaImage,
    flipped: bool,
    upscaled: bool,
}

impl PreparedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            flipped: false,
            upscaled: false,
        }
    }

    /// Flip rows once; further calls leave the buffer untouched
    pub fn orient(&mut self) {
        if self.flipped {
            return;
        }
        imageops::flip_vertical_in_place(&mut self.image);
        self.flipped = true;
    }

    /// Enlarge by an integer factor with Lanczos3
    pub fn upscale(&mut self, factor: u32) -> Result<(), PreprocessError> {
        if self.upscaled || factor <= 1 {
            return Ok(());
        }
        let (width, height) = self.image.dimensions();
        let overflow = || PreprocessError::Overflow {
            width,
            height,
            factor,
        };
        let new_width = width.checked_mul(factor).ok_or_else(overflow)?;
        let new_height = height.checked_mul(factor).ok_or_else(overflow)?;

        self.image = imageops::resize(&self.image, new_width, new_height, FilterType::Lanczos3);
        self.upscaled = true;
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    pub fn is_upscaled(&self) -> bool {
        self.upscaled
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    upscale_factor: u32,
}

impl Preprocessor {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            upscale_factor: config.upscale_factor,
        }
    }

    /// Decode and apply the steps the task's plan asks for
    pub fn prepare(&self, task: &Task) -> Result<PreparedImage, PreprocessError> {
        let mut prepared = PreparedImage::new(Self::decode(task.source())?);

        if task.needs_flip() {
            prepared.orient();
        }
        if task.needs_upscale() {
            prepared.upscale(self.upscale_factor)?;
            let (w, h) = prepared.dimensions();
            debug!("Upscaled {} to {}x{}", task.source().display(), w, h);
        }

        Ok(prepared)
    }

    fn decode(path: &Path) -> Result<RgbaImage, PreprocessError> {
        let reader = BufReader::new(File::open(path)?);
        let image = image::load(reader, ImageFormat::Png)?;

        match image {
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => Err(
                PreprocessError::UnsupportedLayout(format!("{:?}", image.color())),
            ),
            other => Ok(other.to_rgba8()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::Inspection;
    use image::Rgba;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn striped() -> RgbaImage {
        // top row red, bottom row blue
        RgbaImage::from_fn(4, 2, |_, y| {
            if y == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    fn task_for(path: PathBuf, needs_upscale: bool, needs_flip: bool) -> Task {
        let inspection = Inspection {
            width: 4,
            height: 2,
            has_alpha: true,
            needs_upscale,
            needs_flip,
        };
        let destination = path.with_extension("dds");
        Task::planned(0, path, destination, &inspection)
    }

    #[test]
    fn test_orient_is_idempotent() {
        let mut prepared = PreparedImage::new(striped());
        prepared.orient();
        assert!(prepared.is_flipped());
        assert_eq!(prepared.image().get_pixel(0, 0), &Rgba([0, 0, 255, 255]));

        prepared.orient();
        assert_eq!(prepared.image().get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_upscale_doubles_dimensions() {
        let mut prepared = PreparedImage::new(striped());
        prepared.upscale(2).unwrap();
        assert_eq!(prepared.dimensions(), (8, 4));

        prepared.upscale(2).unwrap();
        assert_eq!(prepared.dimensions(), (8, 4));
    }

    #[test]
    fn test_prepare_follows_plan() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wall.png");
        striped().save(&path).unwrap();

        let preprocessor = Preprocessor::new(&RunConfig::new(temp_dir.path()));

        let prepared = preprocessor.prepare(&task_for(path.clone(), true, true)).unwrap();
        assert_eq!(prepared.dimensions(), (8, 4));
        assert!(prepared.is_flipped());
        assert!(prepared.is_upscaled());

        let untouched = preprocessor.prepare(&task_for(path, false, false)).unwrap();
        assert_eq!(untouched.dimensions(), (4, 2));
        assert!(!untouched.is_upscaled());
        assert_eq!(untouched.image().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_corrupt_pixels_fail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\ngarbage").unwrap();

        let preprocessor = Preprocessor::new(&RunConfig::new(temp_dir.path()));
        let result = preprocessor.prepare(&task_for(path, false, true));
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }
}
