//! # inat-common
//!
//! Shared code for the iNaturalist classification tools:
//! - Error type and result alias
//! - Bearer credential handling
//! - TOML configuration loading and credential resolution

pub mod config;
pub mod credential;
pub mod error;

pub use credential::Credential;
pub use error::{Error, Result};
