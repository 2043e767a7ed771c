use std::path::{Path, PathBuf};

use anyhow::Context;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use thiserror::Error;
use tracing::{debug, info};

/// Input handed to a recognition engine.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    /// PNG-encoded nameplate.
    pub image_png: Vec<u8>,
    /// Language hint, e.g. `"eng"`.
    pub language: String,
    /// Characters the caller is willing to accept. Whitespace is always kept.
    pub allowed_chars: String,
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("could not read nameplate image: {0}")]
    InvalidImage(String),
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),
    #[error("recognition engine failed: {0}")]
    Engine(String),
}

/// Turns a nameplate image into text. Implementations are blocking and CPU bound.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, request: &RecognitionRequest) -> Result<String, RecognitionError>;
}

/// Drops characters outside `allowed`, keeping whitespace between words.
pub fn filter_allowed(text: &str, allowed: &str) -> String {
    text.chars()
        .filter(|c| c.is_whitespace() || allowed.contains(*c))
        .collect()
}

/// Applies `requested` to text decoded under `engine_chars`.
///
/// When both sets match the engine already restricted its own decoding and
/// the text is returned as is. Otherwise the requested set is filtered in.
pub fn restrict_output(text: &str, engine_chars: &str, requested: &str) -> String {
    if engine_chars == requested {
        text.to_string()
    } else {
        filter_allowed(text, requested)
    }
}

/// [`Recognizer`] backed by the `ocrs` engine.
///
/// The engine is built with a fixed set of allowed characters so that the
/// decoder itself never emits anything outside it.
pub struct OcrsRecognizer {
    engine: OcrEngine,
    allowed_chars: String,
}

impl OcrsRecognizer {
    /// Default model location used by `ocrs-cli`.
    pub fn default_model_dir() -> anyhow::Result<PathBuf> {
        let home_dir = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("neither HOME nor USERPROFILE is set")?;
        Ok(Path::new(&home_dir).join(".cache/ocrs"))
    }

    pub fn from_default_location(allowed_chars: &str) -> anyhow::Result<Self> {
        Self::from_dir(Self::default_model_dir()?, allowed_chars)
    }

    /// Loads `text-detection.rten` and `text-recognition.rten` from `dir`,
    /// constraining decoding to `allowed_chars`.
    pub fn from_dir(dir: impl AsRef<Path>, allowed_chars: &str) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let detection_model_path = dir.join("text-detection.rten");
        let recognition_model_path = dir.join("text-recognition.rten");

        if !detection_model_path.exists() || !recognition_model_path.exists() {
            anyhow::bail!(
                "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
                 Expected locations:\n  - {}\n  - {}",
                detection_model_path.display(),
                recognition_model_path.display()
            );
        }

        let detection_model = Model::load_file(&detection_model_path)
            .with_context(|| format!("loading {}", detection_model_path.display()))?;
        let recognition_model = Model::load_file(&recognition_model_path)
            .with_context(|| format!("loading {}", recognition_model_path.display()))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            allowed_chars: Some(allowed_chars.to_string()),
            ..Default::default()
        })?;
        info!(dir = %dir.display(), "OCR engine initialized");

        Ok(Self {
            engine,
            allowed_chars: allowed_chars.to_string(),
        })
    }

    pub fn allowed_chars(&self) -> &str {
        &self.allowed_chars
    }
}

impl Recognizer for OcrsRecognizer {
    fn recognize(&self, request: &RecognitionRequest) -> Result<String, RecognitionError> {
        // ocrs ships a Latin-script model only
        if !matches!(request.language.as_str(), "eng" | "en") {
            return Err(RecognitionError::UnsupportedLanguage(request.language.clone()));
        }

        let img = image::load_from_memory(&request.image_png)
            .map_err(|e| RecognitionError::InvalidImage(e.to_string()))?
            .to_rgb8();

        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| RecognitionError::InvalidImage(e.to_string()))?;
        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        let text = self
            .engine
            .get_text(&ocr_input)
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;

        let text = restrict_output(&text, &self.allowed_chars, &request.allowed_chars);
        debug!(%text, "nameplate recognized");
        Ok(text)
    }
}
