//! inat-classify library interface
//!
//! Exposes the pipeline, batch runner and their building blocks for the
//! binary and for integration testing.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::{Endpoints, PipelineConfig, RetryPolicy, TransportSettings};
pub use crate::error::{ClassifyError, ErrorKind, PipelineFailure, Stage, TransportError};
