pub mod config;
pub mod detection;
pub mod error;
pub mod lookup;
pub mod models;
pub mod pipeline;
pub mod resolver;

pub use config::{AppConfig, DetectionConfig, NameplateRegion, ResolverConfig};
pub use detection::CardDetector;
pub use detection::ocr::{OcrsRecognizer, RecognitionError, RecognitionRequest, Recognizer};
pub use error::{Result, ScanError};
pub use lookup::{CardLookup, CatalogLookup, LookupClient, LookupError};
pub use models::{
    BoundingBox, CardLookupOutcome, CardRecord, Contour, ExtractedCard, FailureReason,
    NameplateImage, Quadrilateral,
};
pub use pipeline::{DebugConfig, ScanPipeline, ScanReport};
pub use resolver::ConcurrentCardResolver;
