//! Error types for inat-classify
//!
//! Per-image failures are typed so the batch runner can match on the stage
//! and kind without inspecting message strings. Only configuration errors
//! (`inat_common::Error::Config`) abort a whole run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Response delivered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// No usable response (DNS, connection reset, timeout, body read failure)
    #[error("Network error: {cause}")]
    Network { cause: String },
}

impl TransportError {
    /// HTTP status, 0 for network-level failures
    pub fn status(&self) -> u16 {
        match self {
            TransportError::Status { status, .. } => *status,
            TransportError::Network { .. } => 0,
        }
    }

    /// Network failures, throttling and gateway errors may succeed on retry.
    /// A plain 500 is treated as a permanent answer for this request.
    pub fn is_transient(&self) -> bool {
        matches!(self.status(), 0 | 429 | 502 | 503 | 504)
    }
}

/// Image rejected before any network call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageValidationError {
    #[error("Image not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Unsupported image extension {:?}: {}", .extension, .path.display())]
    UnsupportedExtension { path: PathBuf, extension: String },

    /// Leading bytes do not match any supported image container
    #[error("Unrecognized image content: {}", .0.display())]
    UnrecognizedContent(PathBuf),

    #[error("Cannot read {}: {}", .0.display(), .1)]
    Unreadable(PathBuf, String),
}

/// Per-image pipeline error
#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Validation(#[from] ImageValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response delivered but its shape is not what the endpoint promises
    #[error("Parse error ({context}): {message}")]
    Parse {
        context: &'static str,
        message: String,
        raw_body: String,
    },

    /// Scoring endpoint returned no candidates
    #[error("No taxon candidates returned")]
    NoMatch,
}

impl ClassifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifyError::Validation(_) => ErrorKind::Validation,
            ClassifyError::Transport(_) => ErrorKind::Transport,
            ClassifyError::Parse { .. } => ErrorKind::Parse,
            ClassifyError::NoMatch => ErrorKind::NoMatch,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifyError::Transport(e) if e.is_transient())
    }

    pub(crate) fn parse(context: &'static str, message: impl Into<String>, raw_body: &str) -> Self {
        ClassifyError::Parse {
            context,
            message: message.into(),
            raw_body: raw_body.to_string(),
        }
    }
}

/// Discriminant of [`ClassifyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    Parse,
    NoMatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Parse => "parse",
            ErrorKind::NoMatch => "no_match",
        };
        f.write_str(name)
    }
}

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Upload,
    Classify,
    Resolve,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Upload => "upload",
            Stage::Classify => "classify",
            Stage::Resolve => "resolve",
        };
        f.write_str(name)
    }
}

/// Failed image: which stage stopped it and why
#[derive(Debug, Clone, Error)]
#[error("{} failed at {stage}: {error}", .image_path.display())]
pub struct PipelineFailure {
    pub image_path: PathBuf,
    pub stage: Stage,
    pub error: ClassifyError,
}

impl PipelineFailure {
    pub fn new(image_path: impl Into<PathBuf>, stage: Stage, error: ClassifyError) -> Self {
        Self {
            image_path: image_path.into(),
            stage,
            error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Serializable view of a failure for reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub image_path: PathBuf,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PipelineFailure> for FailureRecord {
    fn from(failure: &PipelineFailure) -> Self {
        Self {
            image_path: failure.image_path.clone(),
            stage: failure.stage,
            kind: failure.kind(),
            message: failure.error.to_string(),
        }
    }
}
