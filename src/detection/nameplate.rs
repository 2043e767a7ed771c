use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use imageproc::map::map_colors;
use tracing::instrument;

use crate::config::{DetectionConfig, NameplateRegion};
use crate::error::{Result, ScanError};
use crate::models::{ExtractedCard, NameplateImage};

/// Crops the title band of a rectified card and binarizes it for OCR.
#[derive(Debug, Clone)]
pub struct NameplateExtractor {
    pub region: NameplateRegion,
    pub threshold: u8,
}

impl NameplateExtractor {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            region: config.nameplate,
            threshold: config.nameplate_threshold,
        }
    }

    /// Pixel rectangle `(x, y, width, height)` of the title band.
    pub fn crop_rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (w, h) = (width as f64, height as f64);
        let x0 = (w * self.region.left) as u32;
        let y0 = (h * self.region.top) as u32;
        let x1 = ((w * self.region.right) as u32).min(width);
        let y1 = ((h * self.region.bottom) as u32).min(height);
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    #[instrument(skip_all, fields(card = card.index))]
    pub fn extract(&self, card: &ExtractedCard) -> Result<NameplateImage> {
        if card.is_empty() {
            return Err(ScanError::EmptyCard);
        }
        let (width, height) = card.image.dimensions();
        let (x, y, w, h) = self.crop_rect(width, height);
        if w == 0 || h == 0 {
            return Err(ScanError::EmptyCard);
        }

        let band = image::imageops::crop_imm(&card.image, x, y, w, h).to_image();
        let gray = image::imageops::grayscale(&band);
        let threshold = self.threshold;
        let binary = map_colors(&gray, |p: Luma<u8>| {
            Luma([if p[0] > threshold { 0u8 } else { 255 }])
        });
        Ok(NameplateImage { image: binary })
    }
}

impl NameplateImage {
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }
}

pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ScanError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
