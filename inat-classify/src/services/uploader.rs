//! Photo upload
//!
//! Posts one validated image as multipart form data and extracts the photo id.

use crate::error::ClassifyError;
use crate::models::{ImageRef, PhotoId};
use crate::services::transport::{Method, MultipartFile, RequestBody, Transport};
use serde::Deserialize;
use std::sync::Arc;

/// Multipart field expected by the upload endpoint
const UPLOAD_FIELD: &str = "file";

/// Upload endpoint response; only the id is required
#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: IdField,
}

/// Numeric id, tolerated as a numeric string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdField {
    Number(u64),
    Text(String),
}

pub struct Uploader {
    transport: Arc<dyn Transport>,
    upload_url: String,
}

impl Uploader {
    pub fn new(transport: Arc<dyn Transport>, upload_url: impl Into<String>) -> Self {
        Self {
            transport,
            upload_url: upload_url.into(),
        }
    }

    /// Upload one image and return its photo id
    pub async fn upload(&self, image: &ImageRef) -> Result<PhotoId, ClassifyError> {
        let bytes = image.read_bytes().await?;
        tracing::info!(image = %image.path().display(), size = bytes.len(), "Uploading image");

        let body = RequestBody::Multipart(MultipartFile {
            field: UPLOAD_FIELD.to_string(),
            file_name: image.file_name(),
            mime_type: image.format().mime_type().to_string(),
            bytes,
        });

        let response = self
            .transport
            .request(Method::POST, &self.upload_url, body)
            .await?;

        let parsed: UploadResponse = response.parse_json("upload")?;
        let photo_id = match parsed.id {
            IdField::Number(id) => PhotoId(id),
            IdField::Text(text) => text.trim().parse().map(PhotoId).map_err(|_| {
                ClassifyError::parse("upload", format!("photo id {:?} is not numeric", text), &response.body)
            })?,
        };

        tracing::info!(image = %image.path().display(), %photo_id, "Upload succeeded");
        Ok(photo_id)
    }
}
