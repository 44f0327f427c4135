//! Accident image analysis
//!
//! Two interchangeable strategies sit behind [`ImageAnalyzer`]: label
//! classification through a vision service, and a no-ML fallback that only
//! inspects the payload's size and magic bytes. Either way, a failed analysis
//! never fails the request; [`analyze_or_default`] degrades it to a
//! conservative risk factor.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Risk factor applied when analysis fails or times out
pub const ANALYSIS_FAILURE_RISK: f64 = 0.6;

/// Risk factor applied when no image was submitted
pub const MISSING_IMAGE_RISK: f64 = 0.5;

pub const LOW_IMAGE_RISK: f64 = 0.1;
pub const MEDIUM_IMAGE_RISK: f64 = 0.3;
pub const HIGH_IMAGE_RISK: f64 = 0.8;

pub const MIN_IMAGE_BYTES: usize = 1024;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Labels that make an image plausible evidence of an accident
pub const ACCIDENT_VOCABULARY: [&str; 14] = [
    "accident",
    "injury",
    "wound",
    "blood",
    "crash",
    "collision",
    "vehicle",
    "ambulance",
    "hospital",
    "emergency",
    "wreck",
    "trauma",
    "bandage",
    "fracture",
];

const VISION_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub top_class: String,
    pub confidence: f64,
    pub risk_factor: f64,
}

impl ImageAnalysis {
    fn new(top_class: impl Into<String>, confidence: f64, risk_factor: f64) -> Self {
        Self {
            top_class: top_class.into(),
            confidence,
            risk_factor,
        }
    }

    pub fn unavailable() -> Self {
        Self::new("analysis_unavailable", 0.0, ANALYSIS_FAILURE_RISK)
    }
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image payload is not valid base64: {0}")]
    Decode(String),

    #[error("image classifier failed: {0}")]
    Classifier(String),
}

impl From<reqwest::Error> for ImageError {
    fn from(err: reqwest::Error) -> Self {
        ImageError::Classifier(err.to_string())
    }
}

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyze a base64 payload (a `data:` URL prefix is accepted)
    async fn analyze(&self, payload: &str) -> Result<ImageAnalysis, ImageError>;
}

/// Run an analyzer, degrading errors and timeouts to [`ANALYSIS_FAILURE_RISK`]
pub async fn analyze_or_default(
    analyzer: &dyn ImageAnalyzer,
    payload: &str,
    timeout: Duration,
) -> ImageAnalysis {
    match tokio::time::timeout(timeout, analyzer.analyze(payload)).await {
        Ok(Ok(analysis)) => analysis,
        Ok(Err(e)) => {
            tracing::warn!(analyzer = analyzer.name(), error = %e, "Image analysis failed");
            ImageAnalysis::unavailable()
        }
        Err(_) => {
            tracing::warn!(
                analyzer = analyzer.name(),
                timeout_ms = %timeout.as_millis(),
                "Image analysis timed out"
            );
            ImageAnalysis::unavailable()
        }
    }
}

/// Strip an optional data-URL prefix and decode
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, ImageError> {
    let encoded = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ImageError::Decode(e.to_string()))
}

// ============================================================================
// Heuristic strategy
// ============================================================================

/// Format and size checks only
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicImageAnalyzer;

impl HeuristicImageAnalyzer {
    pub fn classify_bytes(bytes: &[u8]) -> ImageAnalysis {
        if !(bytes.starts_with(&JPEG_MAGIC) || bytes.starts_with(&PNG_MAGIC)) {
            return ImageAnalysis::new("invalid_format", 1.0, 1.0);
        }
        if bytes.len() < MIN_IMAGE_BYTES {
            return ImageAnalysis::new("too_small", 1.0, HIGH_IMAGE_RISK);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return ImageAnalysis::new("too_large", 1.0, HIGH_IMAGE_RISK);
        }
        ImageAnalysis::new("assumed_valid", 0.5, 0.2)
    }
}

#[async_trait]
impl ImageAnalyzer for HeuristicImageAnalyzer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn analyze(&self, payload: &str) -> Result<ImageAnalysis, ImageError> {
        let bytes = decode_image_payload(payload)?;
        Ok(Self::classify_bytes(&bytes))
    }
}

// ============================================================================
// Label strategy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub description: String,
    pub score: f64,
}

/// Image bytes to ranked labels
#[async_trait]
pub trait LabelClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<Vec<Label>, ImageError>;
}

/// Matches classifier labels against [`ACCIDENT_VOCABULARY`]
#[derive(Clone)]
pub struct LabelImageAnalyzer {
    classifier: Arc<dyn LabelClassifier>,
}

impl LabelImageAnalyzer {
    pub fn new(classifier: Arc<dyn LabelClassifier>) -> Self {
        Self { classifier }
    }

    /// Two or more confident accident labels is low risk, a single plausible
    /// one is medium, anything else high.
    pub fn assess_labels(labels: &[Label]) -> ImageAnalysis {
        let top = labels
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score));

        let matches: Vec<&Label> = labels
            .iter()
            .filter(|label| {
                let description = label.description.to_lowercase();
                ACCIDENT_VOCABULARY
                    .iter()
                    .any(|term| description.contains(term))
            })
            .collect();

        let best_match = matches
            .iter()
            .map(|label| label.score)
            .fold(0.0_f64, f64::max);

        let risk_factor = if matches.len() >= 2 && best_match >= 0.7 {
            LOW_IMAGE_RISK
        } else if !matches.is_empty() && best_match >= 0.5 {
            MEDIUM_IMAGE_RISK
        } else {
            HIGH_IMAGE_RISK
        };

        match top {
            Some(label) => ImageAnalysis::new(label.description.clone(), label.score, risk_factor),
            None => ImageAnalysis::new("unknown", 0.0, risk_factor),
        }
    }
}

#[async_trait]
impl ImageAnalyzer for LabelImageAnalyzer {
    fn name(&self) -> &'static str {
        "labels"
    }

    async fn analyze(&self, payload: &str) -> Result<ImageAnalysis, ImageError> {
        let bytes = decode_image_payload(payload)?;
        let labels = self.classifier.classify(&bytes).await?;
        Ok(Self::assess_labels(&labels))
    }
}

/// Google Vision `LABEL_DETECTION`
#[derive(Clone)]
pub struct GoogleVisionClassifier {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    #[serde(default)]
    label_annotations: Vec<Label>,
    #[serde(default)]
    error: Option<AnnotateError>,
}

#[derive(Debug, Deserialize)]
struct AnnotateError {
    message: String,
}

impl GoogleVisionClassifier {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl LabelClassifier for GoogleVisionClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Vec<Label>, ImageError> {
        let body = serde_json::json!({
            "requests": [{
                "image": { "content": STANDARD.encode(image) },
                "features": [{ "type": "LABEL_DETECTION", "maxResults": 10 }],
            }]
        });

        let response: AnnotateResponse = self
            .http
            .post(VISION_ANNOTATE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let result = response
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| ImageError::Classifier("empty annotate response".to_string()))?;

        if let Some(error) = result.error {
            return Err(ImageError::Classifier(error.message));
        }

        Ok(result.label_annotations)
    }
}
