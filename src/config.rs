use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Fractional rectangle of the rectified card that holds the printed title.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NameplateRegion {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Default for NameplateRegion {
    fn default() -> Self {
        Self {
            left: 0.05,
            top: 0.04,
            right: 0.95,
            bottom: 0.10,
        }
    }
}

/// Thresholds for the detection and extraction stages.
///
/// All values are tuned for phone photographs of roughly 1-4 megapixels.
/// They are resolution dependent: `min_contour_area` in particular counts
/// source pixels, not a fraction of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Luma value above which a pixel counts as specular glare.
    pub glare_threshold: u8,
    /// Chebyshev radius of the glare mask dilation (1 = 3x3).
    pub glare_dilate_radius: u8,
    /// Neighbourhood radius used when inpainting glare pixels.
    pub inpaint_radius: u32,
    /// Chebyshev radius of the per-channel dilation (1 = 3x3).
    pub channel_dilate_radius: u8,
    /// Per-channel local gradient above which a pixel counts as an edge.
    pub gradient_threshold: u8,
    /// Chebyshev radius of the edge map closing (4 = 9x9).
    pub close_radius: u8,
    /// Minimum enclosed contour area, in square pixels.
    pub min_contour_area: f64,
    /// Polygon approximation tolerance as a fraction of contour perimeter.
    pub approx_epsilon_fraction: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub card_width: u32,
    pub card_height: u32,
    pub nameplate: NameplateRegion,
    /// Grey level above which nameplate pixels become background.
    pub nameplate_threshold: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            glare_threshold: 240,
            glare_dilate_radius: 1,
            inpaint_radius: 5,
            channel_dilate_radius: 1,
            gradient_threshold: 20,
            close_radius: 4,
            min_contour_area: 5000.0,
            approx_epsilon_fraction: 0.02,
            min_aspect_ratio: 1.10,
            max_aspect_ratio: 2.20,
            card_width: 240,
            card_height: 336,
            nameplate: NameplateRegion::default(),
            nameplate_threshold: 127,
        }
    }
}

impl DetectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_contour_area(mut self, area: f64) -> Self {
        self.min_contour_area = area;
        self
    }

    pub fn with_aspect_ratio_range(mut self, min: f64, max: f64) -> Self {
        self.min_aspect_ratio = min;
        self.max_aspect_ratio = max;
        self
    }

    pub fn with_gradient_threshold(mut self, threshold: u8) -> Self {
        self.gradient_threshold = threshold;
        self
    }

    pub fn with_glare_threshold(mut self, threshold: u8) -> Self {
        self.glare_threshold = threshold;
        self
    }

    pub fn with_card_size(mut self, width: u32, height: u32) -> Self {
        self.card_width = width;
        self.card_height = height;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.card_width == 0 || self.card_height == 0 {
            return Err(ScanError::Config("card size must be non-zero".into()));
        }
        if !(self.min_aspect_ratio >= 1.0 && self.min_aspect_ratio <= self.max_aspect_ratio) {
            return Err(ScanError::Config(format!(
                "aspect ratio range [{}, {}] is invalid",
                self.min_aspect_ratio, self.max_aspect_ratio
            )));
        }
        if !(self.approx_epsilon_fraction > 0.0 && self.approx_epsilon_fraction < 1.0) {
            return Err(ScanError::Config(
                "approx_epsilon_fraction must be in (0, 1)".into(),
            ));
        }
        if self.min_contour_area < 0.0 {
            return Err(ScanError::Config("min_contour_area must be >= 0".into()));
        }
        let r = &self.nameplate;
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(r.left) && in_unit(r.right) && in_unit(r.top) && in_unit(r.bottom))
            || r.left >= r.right
            || r.top >= r.bottom
        {
            return Err(ScanError::Config(format!(
                "nameplate region {:?} is not a rectangle inside the card",
                r
            )));
        }
        Ok(())
    }
}

/// Settings for the per-card recognition and lookup fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// One budget shared by every lookup of a request.
    #[serde(with = "duration_secs")]
    pub lookup_budget: Duration,
    /// Budget for each individual recognition call.
    #[serde(with = "duration_secs")]
    pub recognition_timeout: Duration,
    pub language: String,
    pub allowed_chars: String,
}

pub const LATIN_LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lookup_budget: Duration::from_secs(30),
            recognition_timeout: Duration::from_secs(10),
            language: "eng".to_string(),
            allowed_chars: LATIN_LETTERS.to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn with_lookup_budget(mut self, budget: Duration) -> Self {
        self.lookup_budget = budget;
        self
    }

    pub fn with_recognition_timeout(mut self, timeout: Duration) -> Self {
        self.recognition_timeout = timeout;
        self
    }
}

/// Top-level settings, read from an optional JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detection: DetectionConfig,
    pub resolver: ResolverConfig,
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        if self.resolver.lookup_budget.is_zero() {
            return Err(ScanError::Config("lookup_budget must be non-zero".into()));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
