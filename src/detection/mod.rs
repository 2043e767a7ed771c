pub mod edges;
pub mod glare;
pub mod nameplate;
pub mod ocr;
pub mod quads;
pub mod rectify;

use image::{GrayImage, RgbImage};
use tracing::{info, instrument};

use crate::config::DetectionConfig;
use crate::error::Result;
use crate::models::{ExtractedCard, Quadrilateral};

use edges::EdgeMapBuilder;
use glare::GlareCorrector;
use quads::QuadrilateralDetector;
use rectify::CardRectifier;

/// Intermediate buffers of one detection run.
#[derive(Debug, Clone)]
pub struct DetectionTrace {
    pub corrected: RgbImage,
    pub edge_map: GrayImage,
    pub quads: Vec<Quadrilateral>,
}

/// Glare correction, edge map, quadrilateral search and rectification.
///
/// Every stage is a synchronous transform that allocates its own output.
#[derive(Debug, Clone)]
pub struct CardDetector {
    glare: GlareCorrector,
    edges: EdgeMapBuilder,
    quads: QuadrilateralDetector,
    rectifier: CardRectifier,
}

impl CardDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            glare: GlareCorrector::from_config(config),
            edges: EdgeMapBuilder::from_config(config),
            quads: QuadrilateralDetector::from_config(config),
            rectifier: CardRectifier::from_config(config),
        }
    }

    /// Runs stages 1-3 and keeps their outputs.
    #[instrument(skip_all, fields(width = img.width(), height = img.height()))]
    pub fn trace(&self, img: &RgbImage) -> DetectionTrace {
        let corrected = self.glare.correct(img);
        let edge_map = self.edges.build(&corrected);
        let quads = self.quads.detect(&edge_map);
        info!(cards = quads.len(), "quadrilaterals detected");
        DetectionTrace {
            corrected,
            edge_map,
            quads,
        }
    }

    pub fn detect_quadrilaterals(&self, img: &RgbImage) -> Vec<Quadrilateral> {
        self.trace(img).quads
    }

    /// Warps each quad out of the untouched source image.
    pub fn rectify_all(&self, source: &RgbImage, quads: &[Quadrilateral]) -> Result<Vec<ExtractedCard>> {
        quads
            .iter()
            .enumerate()
            .map(|(i, q)| self.rectifier.rectify(source, q, i))
            .collect()
    }
}

impl Default for CardDetector {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}
