//! Image references and photo identifiers

use crate::error::ImageValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Extensions accepted for classification (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

/// Check whether a file extension is a supported image extension
pub fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Check a path's extension
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| is_supported_extension(&ext.to_string_lossy()))
        .unwrap_or(false)
}

/// Image container detected from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Tiff,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
        }
    }

    /// Identify the container from the first bytes of a file
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        match header {
            [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
            [b'B', b'M', ..] => Some(ImageFormat::Bmp),
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(ImageFormat::Tiff),
            _ => None,
        }
    }
}

/// A validated image on disk
///
/// Construction checks, in order: supported extension, existence, regular
/// file, recognizable image header. No network call happens before an
/// `ImageRef` exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    path: PathBuf,
    format: ImageFormat,
}

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ImageValidationError> {
        let path = path.into();

        if !has_supported_extension(&path) {
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(ImageValidationError::UnsupportedExtension { path, extension });
        }

        if !path.exists() {
            return Err(ImageValidationError::NotFound(path));
        }

        if !path.is_file() {
            return Err(ImageValidationError::NotAFile(path));
        }

        let format = read_format(&path)?;
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// File name for multipart uploads
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    }

    /// Read the whole file for upload
    pub async fn read_bytes(&self) -> Result<Vec<u8>, ImageValidationError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| ImageValidationError::Unreadable(self.path.clone(), e.to_string()))
    }
}

fn read_format(path: &Path) -> Result<ImageFormat, ImageValidationError> {
    let mut file = File::open(path)
        .map_err(|e| ImageValidationError::Unreadable(path.to_path_buf(), e.to_string()))?;

    let mut buffer = [0u8; 8];
    let mut filled = 0;
    // read() may return short counts; fill until EOF or 8 bytes
    while filled < buffer.len() {
        let n = file
            .read(&mut buffer[filled..])
            .map_err(|e| ImageValidationError::Unreadable(path.to_path_buf(), e.to_string()))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    ImageFormat::from_magic(&buffer[..filled])
        .ok_or_else(|| ImageValidationError::UnrecognizedContent(path.to_path_buf()))
}

/// Identifier assigned by the upload endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(pub u64);

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
