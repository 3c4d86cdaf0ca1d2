//! # Image Inspector
//!
//! Legge solo l'header PNG (niente decode dei pixel) e decide il piano
//! di conversione di ogni texture.
//!
//! ## Responsabilità:
//! - Estrae larghezza, altezza, color type e presenza di alpha
//! - Decide se serve l'upscale (`max(w, h) < min_upscale_dimension`)
//! - Decide se serve il flip verticale (ordine righe PNG != ordine richiesto)
//!
//! Il flip dipende solo dal formato, mai dal contenuto: un PNG è sempre
//! top-down, quindi con il default bottom-up ogni texture viene ribaltata.

use crate::config::{RowOrder, RunConfig};
use crate::error::InspectError;
use image::codecs::png::PngDecoder;
use image::{ColorType, ImageDecoder};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Row order in which PNG stores pixel data
pub const PNG_ROW_ORDER: RowOrder = RowOrder::TopDown;

/// Header facts and the decisions derived from them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub needs_upscale: bool,
    pub needs_flip: bool,
}

#[derive(Debug, Clone)]
pub struct ImageInspector {
    enable_upscale: bool,
    min_upscale_dimension: u32,
    target_row_order: RowOrder,
}

impl ImageInspector {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            enable_upscale: config.enable_upscale,
            min_upscale_dimension: config.min_upscale_dimension,
            target_row_order: config.target_row_order,
        }
    }

    /// Inspect the header of `path`. Pixel data is never decoded here.
    pub fn inspect(&self, path: &Path) -> Result<Inspection, InspectError> {
        let reader = BufReader::new(File::open(path)?);
        let decoder = PngDecoder::new(reader)?;

        let (width, height) = decoder.dimensions();
        if width == 0 || height == 0 {
            return Err(InspectError::Empty);
        }
        let color_type: ColorType = decoder.color_type();

        Ok(Inspection {
            width,
            height,
            has_alpha: color_type.has_alpha(),
            needs_upscale: self.needs_upscale(width, height),
            needs_flip: PNG_ROW_ORDER != self.target_row_order,
        })
    }

    fn needs_upscale(&self, width: u32, height: u32) -> bool {
        self.enable_upscale && width.max(height) < self.min_upscale_dimension
    }
}
