use thiserror::Error;

/// Request-level failures. Per-card problems are not errors, they travel as
/// [`crate::models::FailureReason`] inside each card's outcome.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("no cards found in image")]
    NoCardsDetected,

    #[error("quadrilateral is degenerate (zero area)")]
    DegenerateQuadrilateral,

    #[error("extracted card image is empty")]
    EmptyCard,

    #[error("image processing failed: {0}")]
    Processing(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
