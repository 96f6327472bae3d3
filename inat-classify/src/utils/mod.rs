//! Utility modules for inat-classify

pub mod retry;

pub use retry::retry_transient;
