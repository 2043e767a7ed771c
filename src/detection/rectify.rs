use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::{debug, instrument};

use crate::config::DetectionConfig;
use crate::error::{Result, ScanError};
use crate::models::{ExtractedCard, Quadrilateral};

/// Warps a detected quadrilateral onto an upright card-sized canvas.
#[derive(Debug, Clone)]
pub struct CardRectifier {
    pub width: u32,
    pub height: u32,
}

impl CardRectifier {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            width: config.card_width,
            height: config.card_height,
        }
    }

    /// Projection taking the ordered corners to the canvas corners.
    pub fn projection(&self, quad: &Quadrilateral) -> Result<Projection> {
        if quad.is_degenerate() {
            return Err(ScanError::DegenerateQuadrilateral);
        }
        let src = quad.corners().map(|p| (p.x as f32, p.y as f32));
        let (w, h) = (self.width as f32, self.height as f32);
        let dst = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        Projection::from_control_points(src, dst).ok_or(ScanError::DegenerateQuadrilateral)
    }

    /// Resamples `source` through the quad. `source` should be the original
    /// photograph, not the glare-corrected copy, so text keeps its true colours.
    #[instrument(skip(self, source, quad))]
    pub fn rectify(&self, source: &RgbImage, quad: &Quadrilateral, index: usize) -> Result<ExtractedCard> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::Processing("card canvas has zero size".into()));
        }
        let projection = self.projection(quad)?;
        let mut out = RgbImage::new(self.width, self.height);
        warp_into(source, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
        debug!(corners = ?quad.corners(), "card rectified");
        Ok(ExtractedCard { index, image: out })
    }
}
