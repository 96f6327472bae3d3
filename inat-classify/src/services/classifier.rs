//! Computer-vision scoring
//!
//! Sends a photo id (or the raw image) to the scoring endpoint and selects the
//! best candidate. The service's ranking is trusted as-is: low scores are
//! logged, never rejected.

use crate::error::ClassifyError;
use crate::models::{ImageRef, PhotoId, TaxonCandidate};
use crate::services::transport::{Method, MultipartFile, RequestBody, Transport, TransportResponse};
use serde::Deserialize;
use std::sync::Arc;

/// Multipart field for raw-image scoring
const IMAGE_FIELD: &str = "image";

/// Scoring responses come either as a flat candidate list or wrapped in the
/// iNaturalist `results` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreResponse {
    Flat(Vec<FlatCandidate>),
    Envelope(ScoreEnvelope),
}

#[derive(Debug, Deserialize)]
struct FlatCandidate {
    taxon_id: u64,
    name: String,
    #[serde(default)]
    common_name: Option<String>,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct ScoreEnvelope {
    results: Vec<EnvelopeResult>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeResult {
    /// Already on the [0, 1] scale
    #[serde(default)]
    score: Option<f64>,
    /// On the 0-100 scale
    #[serde(default)]
    combined_score: Option<f64>,
    taxon: EnvelopeTaxon,
}

#[derive(Debug, Deserialize)]
struct EnvelopeTaxon {
    id: u64,
    name: String,
    #[serde(default)]
    preferred_common_name: Option<String>,
}

pub struct Classifier {
    transport: Arc<dyn Transport>,
    score_url: String,
    min_confidence: Option<f64>,
}

impl Classifier {
    pub fn new(transport: Arc<dyn Transport>, score_url: impl Into<String>) -> Self {
        Self {
            transport,
            score_url: score_url.into(),
            min_confidence: None,
        }
    }

    /// Scores below this threshold are logged as low confidence
    pub fn with_min_confidence(mut self, min_confidence: Option<f64>) -> Self {
        self.min_confidence = min_confidence.map(|m| m.clamp(0.0, 1.0));
        self
    }

    /// Score an uploaded photo
    pub async fn classify(&self, photo_id: PhotoId) -> Result<TaxonCandidate, ClassifyError> {
        tracing::info!(%photo_id, "Requesting classification");
        let body = RequestBody::Json(serde_json::json!({ "photo_id": photo_id.0 }));
        let response = self
            .transport
            .request(Method::POST, &self.score_url, body)
            .await?;
        self.select(&response)
    }

    /// Score raw image bytes without uploading first
    pub async fn classify_image(&self, image: &ImageRef) -> Result<TaxonCandidate, ClassifyError> {
        tracing::info!(image = %image.path().display(), "Requesting classification from image bytes");
        let body = RequestBody::Multipart(MultipartFile {
            field: IMAGE_FIELD.to_string(),
            file_name: image.file_name(),
            mime_type: image.format().mime_type().to_string(),
            bytes: image.read_bytes().await?,
        });
        let response = self
            .transport
            .request(Method::POST, &self.score_url, body)
            .await?;
        self.select(&response)
    }

    fn select(&self, response: &TransportResponse) -> Result<TaxonCandidate, ClassifyError> {
        let parsed: ScoreResponse = response.parse_json("score")?;
        let candidates = into_candidates(parsed, &response.body)?;
        let count = candidates.len();

        let best = TaxonCandidate::select_best(candidates).ok_or(ClassifyError::NoMatch)?;

        tracing::info!(
            taxon_id = best.taxon_id,
            name = %best.name,
            score = best.score,
            candidates = count,
            "Best classification"
        );

        if let Some(min) = self.min_confidence {
            if best.score < min {
                tracing::warn!(
                    taxon_id = best.taxon_id,
                    score = best.score,
                    min_confidence = min,
                    "Top candidate is below the confidence threshold"
                );
            }
        }

        Ok(best)
    }
}

fn into_candidates(response: ScoreResponse, raw_body: &str) -> Result<Vec<TaxonCandidate>, ClassifyError> {
    let candidates: Vec<TaxonCandidate> = match response {
        ScoreResponse::Flat(list) => list
            .into_iter()
            .map(|c| TaxonCandidate {
                taxon_id: c.taxon_id,
                name: c.name,
                common_name: c.common_name,
                score: c.score,
            })
            .collect(),
        ScoreResponse::Envelope(envelope) => envelope
            .results
            .into_iter()
            .map(|r| {
                let score = match (r.score, r.combined_score) {
                    (Some(score), _) => score,
                    (None, Some(combined)) => combined / 100.0,
                    (None, None) => {
                        return Err(ClassifyError::parse(
                            "score",
                            format!("candidate {} has no score", r.taxon.id),
                            raw_body,
                        ))
                    }
                };
                Ok(TaxonCandidate {
                    taxon_id: r.taxon.id,
                    name: r.taxon.name,
                    common_name: r.taxon.preferred_common_name,
                    score,
                })
            })
            .collect::<Result<_, _>>()?,
    };

    if let Some(bad) = candidates
        .iter()
        .find(|c| !c.score.is_finite() || !(0.0..=1.0).contains(&c.score))
    {
        return Err(ClassifyError::parse(
            "score",
            format!("candidate {} has score {} outside [0, 1]", bad.taxon_id, bad.score),
            raw_body,
        ));
    }

    Ok(candidates)
}
