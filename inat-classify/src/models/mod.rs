//! Data model of the classification pipeline

pub mod image;
pub mod result;
pub mod taxon;

pub use image::{ImageFormat, ImageRef, PhotoId, SUPPORTED_EXTENSIONS};
pub use result::{BatchReport, BatchSummary, ClassificationResult, HierarchyStats, ImageOutcome};
pub use taxon::{Hierarchy, Rank, TaxonCandidate, ABSENT_MARKER};
