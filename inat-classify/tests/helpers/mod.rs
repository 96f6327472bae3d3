//! Test Helper Utilities
//!
//! Shared utilities for testing inat-classify

#![allow(dead_code, unused_imports)]

pub mod image_fixtures;
pub mod scripted_transport;

// Re-export commonly used items
pub use image_fixtures::{write_corrupt, write_jpeg, write_png, write_text};
pub use scripted_transport::{
    http_status, scores_body, taxon_body, upload_body, RecordedCall, ScriptedTransport,
};

use inat_classify::config::{Endpoints, PipelineConfig, RetryPolicy};
use std::time::Duration;

/// Pipeline configuration for tests: fake base URL, no pacing, fast retries
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        endpoints: Endpoints::new("http://inat.test/v1"),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
        pacing: Duration::ZERO,
        ..PipelineConfig::default()
    }
}
