use image::{GrayImage, RgbImage};
use imageproc::point::Point;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use thiserror::Error;

/// Axis-aligned bounds of a contour, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Ratio of the long side to the short side, always >= 1.
    pub fn aspect_ratio(&self) -> f64 {
        let long = self.width.max(self.height) as f64;
        let short = self.width.min(self.height) as f64;
        if short == 0.0 {
            return f64::INFINITY;
        }
        long / short
    }
}

/// Closed boundary traced from the edge map.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
}

impl Contour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    /// Enclosed area (shoelace formula).
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Length of the closed boundary.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                (((b.x - a.x) as f64).powi(2) + ((b.y - a.y) as f64).powi(2)).sqrt()
            })
            .sum()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(BoundingBox {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }
}

pub(crate) fn polygon_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();
    twice.abs() as f64 / 2.0
}

/// Four corners ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quadrilateral {
    corners: [Point<i32>; 4],
}

impl Quadrilateral {
    /// Orders arbitrary corners with [`crate::detection::quads::order_points`].
    pub fn from_unordered(points: [Point<i32>; 4]) -> Self {
        Self {
            corners: crate::detection::quads::order_points(points),
        }
    }

    pub fn corners(&self) -> [Point<i32>; 4] {
        self.corners
    }

    pub fn top_left(&self) -> Point<i32> {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point<i32> {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point<i32> {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point<i32> {
        self.corners[3]
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.corners)
    }

    pub fn is_degenerate(&self) -> bool {
        self.area() == 0.0
    }
}

impl serde::Serialize for Quadrilateral {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<[i32; 2]> = self.corners.iter().map(|p| [p.x, p.y]).collect();
        pairs.serialize(serializer)
    }
}

/// Upright, fixed-size card cut out of the source photograph.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCard {
    /// Position of the originating quadrilateral in detection order.
    pub index: usize,
    pub image: RgbImage,
}

impl ExtractedCard {
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

/// Two-level title crop: text is 255, background 0.
#[derive(Debug, Clone, PartialEq)]
pub struct NameplateImage {
    pub image: GrayImage,
}

/// Card metadata returned by the lookup service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct CardRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mana_cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CardRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            set: None,
            type_line: None,
            mana_cost: None,
            uri: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Why a single card could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("nameplate extraction failed: {0}")]
    Extraction(String),
    #[error("OCR error: {0}")]
    Recognition(String),
    #[error("OCR timed out")]
    RecognitionTimeout,
    #[error("no card name could be detected on this card")]
    NoTextDetected,
    #[error("card not found for query '{query}'")]
    NotFound { query: String },
    #[error("card lookup timed out")]
    LookupTimeout,
    #[error("card lookup failed: {0}")]
    Lookup(String),
    #[error("card task aborted unexpectedly")]
    TaskPanicked,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Extraction(_) => "extraction",
            FailureReason::Recognition(_) => "recognition",
            FailureReason::RecognitionTimeout => "recognition_timeout",
            FailureReason::NoTextDetected => "no_text_detected",
            FailureReason::NotFound { .. } => "not_found",
            FailureReason::LookupTimeout => "lookup_timeout",
            FailureReason::Lookup(_) => "lookup",
            FailureReason::TaskPanicked => "task_panicked",
        }
    }
}

/// Result of resolving one detected card.
#[derive(Debug, Clone, PartialEq)]
pub enum CardLookupOutcome {
    Success {
        card_index: usize,
        data: CardRecord,
    },
    Failure {
        card_index: usize,
        reason: FailureReason,
        detected_text: Option<String>,
    },
}

impl CardLookupOutcome {
    pub fn card_index(&self) -> usize {
        match self {
            CardLookupOutcome::Success { card_index, .. }
            | CardLookupOutcome::Failure { card_index, .. } => *card_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CardLookupOutcome::Success { .. })
    }

    pub fn detected_text(&self) -> Option<&str> {
        match self {
            CardLookupOutcome::Success { .. } => None,
            CardLookupOutcome::Failure { detected_text, .. } => detected_text.as_deref(),
        }
    }
}

impl Serialize for CardLookupOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CardLookupOutcome::Success { card_index, data } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("status", "success")?;
                map.serialize_entry("card_index", card_index)?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            CardLookupOutcome::Failure {
                card_index,
                reason,
                detected_text,
            } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("card_index", card_index)?;
                map.serialize_entry("error", &reason.to_string())?;
                map.serialize_entry("reason", reason.code())?;
                if let Some(text) = detected_text {
                    map.serialize_entry("detected_text", text)?;
                }
                map.end()
            }
        }
    }
}
