//! Service modules for the classification workflow
//!
//! Transport → Uploader → Classifier → Hierarchy Resolver, composed by the
//! Pipeline and driven over a directory by the Batch Runner.

pub mod batch_runner;
pub mod classifier;
pub mod file_scanner;
pub mod hierarchy_resolver;
pub mod organizer;
pub mod pipeline;
pub mod results_store;
pub mod token_validator;
pub mod transport;
pub mod uploader;

pub use batch_runner::BatchRunner;
pub use classifier::Classifier;
pub use file_scanner::{ImageScanner, ScanError};
pub use hierarchy_resolver::{extract_hierarchy, HierarchyResolver, TaxonNode};
pub use organizer::{OrganizeMode, OrganizeReport, Organizer};
pub use pipeline::Pipeline;
pub use results_store::{ResultsDocument, ResultsStore, ResumePlan};
pub use token_validator::{TokenStatus, TokenValidator};
pub use transport::{HttpTransport, Method, MultipartFile, RequestBody, Transport, TransportResponse};
pub use uploader::Uploader;
