use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::DetectionConfig;
use crate::detection::nameplate::NameplateExtractor;
use crate::detection::ocr::Recognizer;
use crate::detection::CardDetector;
use crate::error::{Result, ScanError};
use crate::lookup::CardLookup;
use crate::models::{CardLookupOutcome, ExtractedCard, Quadrilateral};
use crate::resolver::ConcurrentCardResolver;

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Everything a caller needs to answer one request.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub cards_detected: usize,
    #[serde(rename = "results")]
    pub outcomes: Vec<CardLookupOutcome>,
}

impl ScanReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Request-level driver: decode, detect, rectify, then hand cards to a resolver.
#[derive(Clone, Debug)]
pub struct ScanPipeline {
    config: DetectionConfig,
    detector: CardDetector,
    nameplate: NameplateExtractor,
    debug: Option<DebugConfig>,
}

impl ScanPipeline {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            detector: CardDetector::new(config),
            nameplate: NameplateExtractor::from_config(config),
            debug: None,
        })
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(ScanError::Config(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn nameplate_extractor(&self) -> &NameplateExtractor {
        &self.nameplate
    }

    /// Decodes an uploaded photograph into an owned RGB buffer.
    pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(ScanError::Decode("empty upload".into()));
        }
        let img = image::load_from_memory(bytes)
            .map_err(|e| ScanError::Decode(e.to_string()))?
            .to_rgb8();
        if img.width() == 0 || img.height() == 0 {
            return Err(ScanError::Decode("image has no pixels".into()));
        }
        Ok(img)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<RgbImage> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::decode(&bytes)
    }

    /// Stages 1-3. Zero results is [`ScanError::NoCardsDetected`].
    #[instrument(skip_all, fields(width = img.width(), height = img.height()))]
    pub fn detect(&self, img: &RgbImage) -> Result<Vec<Quadrilateral>> {
        self.save_rgb("00_input", 1, img)?;
        let trace = self.detector.trace(img);
        self.save_rgb("01_glare_corrected", 1, &trace.corrected)?;
        self.save_gray("02_edge_map", 1, &trace.edge_map)?;
        if trace.quads.is_empty() {
            info!("no cards found");
            return Err(ScanError::NoCardsDetected);
        }
        Ok(trace.quads)
    }

    /// Stages 1-4 on the calling thread.
    pub fn extract_cards(&self, img: &RgbImage) -> Result<Vec<ExtractedCard>> {
        let quads = self.detect(img)?;
        let cards = self.detector.rectify_all(img, &quads)?;
        if self.debug.is_some() {
            for card in &cards {
                self.save_rgb("03_cards", card.index + 1, &card.image)?;
                if let Ok(plate) = self.nameplate.extract(card) {
                    self.save_gray("04_nameplates", card.index + 1, &plate.image)?;
                }
            }
        }
        Ok(cards)
    }

    /// Full request: decode and extract on the blocking pool, then resolve.
    pub async fn scan<L, R>(
        &self,
        bytes: Vec<u8>,
        resolver: &ConcurrentCardResolver<L, R>,
    ) -> Result<ScanReport>
    where
        L: CardLookup + 'static,
        R: Recognizer + 'static,
    {
        let pipeline = self.clone();
        let cards = tokio::task::spawn_blocking(move || {
            let img = Self::decode(&bytes)?;
            pipeline.extract_cards(&img)
        })
        .await
        .map_err(|e| ScanError::Processing(e.to_string()))??;

        let cards_detected = cards.len();
        let outcomes = resolver.resolve(cards, &self.nameplate).await;
        Ok(ScanReport {
            cards_detected,
            outcomes,
        })
    }

    fn step_path(&self, step: &str, id: usize) -> Result<Option<PathBuf>> {
        let Some(debug_config) = &self.debug else {
            return Ok(None);
        };
        let step_dir = debug_config.output_dir.join(step);
        std::fs::create_dir_all(&step_dir)?;
        Ok(Some(step_dir.join(format!("{:02}.png", id))))
    }

    fn save_rgb(&self, step: &str, id: usize, img: &RgbImage) -> Result<()> {
        if let Some(path) = self.step_path(step, id)? {
            img.save(&path).map_err(|e| ScanError::Encode(e.to_string()))?;
            debug!(path = %path.display(), "debug image saved");
        }
        Ok(())
    }

    fn save_gray(&self, step: &str, id: usize, img: &GrayImage) -> Result<()> {
        if let Some(path) = self.step_path(step, id)? {
            img.save(&path).map_err(|e| ScanError::Encode(e.to_string()))?;
            debug!(path = %path.display(), "debug image saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(ScanPipeline::decode(b"not an image"), Err(ScanError::Decode(_))));
        assert!(matches!(ScanPipeline::decode(&[]), Err(ScanError::Decode(_))));
    }

    #[test]
    fn blank_photo_has_no_cards() {
        let pipeline = ScanPipeline::new(&DetectionConfig::default()).unwrap();
        let img = RgbImage::from_pixel(200, 200, image::Rgb([90, 90, 90]));
        assert!(matches!(pipeline.extract_cards(&img), Err(ScanError::NoCardsDetected)));
    }

    #[test]
    fn debug_dir_must_be_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("leftover.txt"), "x").unwrap();
        let pipeline = ScanPipeline::new(&DetectionConfig::default()).unwrap();
        assert!(matches!(
            pipeline.with_debug(dir.path().to_path_buf()),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn debug_is_off_until_requested() {
        let pipeline = ScanPipeline::new(&DetectionConfig::default()).unwrap();
        assert!(pipeline.debug.is_none());
        assert_eq!(pipeline.step_path("00_input", 1).unwrap(), None);

        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("debug");
        let pipeline = pipeline.with_debug(out.clone()).unwrap();
        assert_eq!(pipeline.step_path("00_input", 1).unwrap(), Some(out.join("00_input/01.png")));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DetectionConfig::default().with_card_size(0, 336);
        assert!(ScanPipeline::new(&config).is_err());
    }
}
