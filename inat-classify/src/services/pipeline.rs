//! Per-image pipeline
//!
//! Validate → Upload → Classify → Resolve, strictly in order. The first
//! failing stage ends the image and is reported as a [`PipelineFailure`].
//! Network stages are wrapped in [`retry_transient`].

use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{ClassifyError, PipelineFailure, Stage};
use crate::models::{ClassificationResult, ImageRef};
use crate::services::classifier::Classifier;
use crate::services::hierarchy_resolver::HierarchyResolver;
use crate::services::transport::Transport;
use crate::services::uploader::Uploader;
use crate::utils::retry_transient;
use inat_common::config::ScoringMode;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct Pipeline {
    uploader: Uploader,
    classifier: Classifier,
    resolver: HierarchyResolver,
    retry: RetryPolicy,
    scoring_mode: ScoringMode,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>, config: &PipelineConfig) -> Self {
        let endpoints = &config.endpoints;
        Self {
            uploader: Uploader::new(transport.clone(), endpoints.upload_url()),
            classifier: Classifier::new(transport.clone(), endpoints.score_url())
                .with_min_confidence(config.min_confidence),
            resolver: HierarchyResolver::new(transport, endpoints.clone())
                .with_locale(config.locale.clone()),
            retry: config.retry.clone(),
            scoring_mode: config.scoring_mode,
        }
    }

    /// Classify one image end to end
    pub async fn process(&self, image_path: &Path) -> Result<ClassificationResult, PipelineFailure> {
        let started = Instant::now();
        let fail = |stage: Stage| {
            move |error: ClassifyError| {
                tracing::warn!(
                    image = %image_path.display(),
                    %stage,
                    kind = %error.kind(),
                    error = %error,
                    "Image failed"
                );
                PipelineFailure::new(image_path, stage, error)
            }
        };

        // Validate
        let image = ImageRef::new(image_path).map_err(|e| fail(Stage::Validate)(e.into()))?;
        tracing::debug!(image = %image_path.display(), format = ?image.format(), "Image validated");

        // Upload + Classify
        let (photo_id, candidate) = match self.scoring_mode {
            ScoringMode::UploadFirst => {
                let photo_id = retry_transient("upload", &self.retry, || self.uploader.upload(&image))
                    .await
                    .map_err(fail(Stage::Upload))?;

                let candidate =
                    retry_transient("classify", &self.retry, || self.classifier.classify(photo_id))
                        .await
                        .map_err(fail(Stage::Classify))?;

                (Some(photo_id), candidate)
            }
            ScoringMode::RawImage => {
                let candidate = retry_transient("classify", &self.retry, || {
                    self.classifier.classify_image(&image)
                })
                .await
                .map_err(fail(Stage::Classify))?;

                (None, candidate)
            }
        };

        // Resolve
        let taxon_id = candidate.taxon_id;
        let hierarchy = retry_transient("taxonomy lookup", &self.retry, || {
            self.resolver.resolve(taxon_id)
        })
        .await
        .map_err(fail(Stage::Resolve))?;

        tracing::info!(
            image = %image_path.display(),
            taxon_id,
            name = %candidate.name,
            score = candidate.score,
            %hierarchy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Image classified"
        );

        Ok(ClassificationResult::new(image_path, photo_id, candidate, hierarchy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::error::{ErrorKind, TransportError};
    use crate::models::PhotoId;
    use crate::services::transport::{Method, RequestBody, TransportResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    const SCORES: &str = r#"[{"taxon_id":876427,"name":"Bundletia moth","score":0.95}]"#;
    const TAXON: &str = r#"{"results":[{"name":"Bundletia pulchra","rank":"species","ancestors":[
        {"name":"Arctiinae","rank":"subfamily"},{"name":"Bundletia","rank":"genus"}]}]}"#;

    /// Replies by URL suffix; upload replies are consumed in order
    struct RouteTransport {
        upload: Mutex<Vec<Result<TransportResponse, TransportError>>>,
        calls: Mutex<Vec<(Method, String, &'static str)>>,
    }

    impl RouteTransport {
        fn new(upload: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                upload: Mutex::new(upload),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for RouteTransport {
        async fn request(
            &self,
            method: Method,
            url: &str,
            body: RequestBody,
        ) -> Result<TransportResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, url.to_string(), body.kind()));
            if url.ends_with("/photos") {
                let mut upload = self.upload.lock().unwrap();
                if upload.len() > 1 {
                    upload.remove(0)
                } else {
                    upload[0].clone()
                }
            } else if url.ends_with("/score_image") {
                Ok(TransportResponse::ok(SCORES))
            } else {
                Ok(TransportResponse::ok(TAXON))
            }
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            endpoints: Endpoints::new("http://api"),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            ..PipelineConfig::default()
        }
    }

    fn write_jpeg(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, JPEG_HEADER).unwrap();
        path
    }

    #[tokio::test]
    async fn test_process_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg(&dir, "moth1.jpg");
        let transport = RouteTransport::new(vec![Ok(TransportResponse::ok(r#"{"id": 5}"#))]);
        let pipeline = Pipeline::new(transport.clone(), &config());

        let result = pipeline.process(&path).await.unwrap();
        assert_eq!(result.photo_id(), Some(PhotoId(5)));
        assert_eq!(result.taxon_id(), 876427);
        assert_eq!(result.score(), 0.95);
        assert_eq!(result.hierarchy().subfamily.as_deref(), Some("Arctiinae"));
        assert_eq!(result.hierarchy().tribe, None);
        assert_eq!(result.hierarchy().genus.as_deref(), Some("Bundletia"));

        let calls = transport.calls.lock().unwrap();
        let kinds: Vec<_> = calls.iter().map(|(_, _, kind)| *kind).collect();
        assert_eq!(kinds, vec!["multipart", "json", "empty"]);
    }

    #[tokio::test]
    async fn test_bad_extension_makes_no_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello").unwrap();
        let transport = RouteTransport::new(vec![Ok(TransportResponse::ok(r#"{"id": 5}"#))]);
        let pipeline = Pipeline::new(transport.clone(), &config());

        let failure = pipeline.process(&path).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Validate);
        assert_eq!(failure.kind(), ErrorKind::Validation);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_500_fails_once_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg(&dir, "moth2.jpg");
        let transport = RouteTransport::new(vec![Err(TransportError::Status {
            status: 500,
            body: "boom".to_string(),
        })]);
        let pipeline = Pipeline::new(transport.clone(), &config());

        let failure = pipeline.process(&path).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Upload);
        assert_eq!(failure.kind(), ErrorKind::Transport);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_503_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg(&dir, "moth3.jpg");
        let transport = RouteTransport::new(vec![
            Err(TransportError::Status {
                status: 503,
                body: String::new(),
            }),
            Ok(TransportResponse::ok(r#"{"id": 9}"#)),
        ]);
        let pipeline = Pipeline::new(transport.clone(), &config());

        let result = pipeline.process(&path).await.unwrap();
        assert_eq!(result.photo_id(), Some(PhotoId(9)));
        // two uploads, one score, one taxonomy
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_raw_image_mode_skips_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg(&dir, "moth4.jpg");
        let transport = RouteTransport::new(vec![Err(TransportError::Network {
            cause: "upload must not be called".to_string(),
        })]);
        let config = PipelineConfig {
            scoring_mode: ScoringMode::RawImage,
            ..config()
        };
        let pipeline = Pipeline::new(transport.clone(), &config);

        let result = pipeline.process(&path).await.unwrap();
        assert_eq!(result.photo_id(), None);
        let calls = transport.calls.lock().unwrap();
        assert!(calls.iter().all(|(_, url, _)| !url.ends_with("/photos")));
        assert_eq!(calls[0].2, "multipart");
    }

    #[tokio::test]
    async fn test_failure_carries_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.jpg");
        let transport = RouteTransport::new(vec![Ok(TransportResponse::ok(r#"{"id": 5}"#))]);
        let pipeline = Pipeline::new(transport, &config());

        let failure = pipeline.process(&path).await.unwrap_err();
        assert_eq!(failure.image_path, path);
        assert!(matches!(failure.error, ClassifyError::Validation(_)));
    }
}
