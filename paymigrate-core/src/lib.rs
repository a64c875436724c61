//! paymigrate core - detection engine and data structures
//!
//! This crate provides:
//! - Data models for detected SourcePay usage
//! - The regex pattern library and the detector built on it
//! - The endpoint mapping dictionary
//! - Content hashing used for drift checks

#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::multiple_crate_versions,  // Common in large dependency trees
    clippy::module_name_repetitions,  // Often necessary for clarity
)]

pub mod detector;
pub mod hash;
pub mod mapping;
pub mod models;
pub mod pattern;

pub use detector::Detector;
pub use hash::{content_hash, content_hash_bytes};
pub use mapping::{
    EndpointMapping, FieldMatchRef, FieldRule, MappingDictionary, MappingLookup, MappingResolver, MappingStatistics,
};
pub use models::{DetectedEndpoint, DetectionReport, EndpointType, Language};
pub use pattern::PatternLibrary;

/// Result type used throughout paymigrate core
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for paymigrate core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A detection pattern failed to compile
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// Mapping dictionary could not be loaded or is malformed
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Endpoint type name not in the closed set
    #[error("Unknown endpoint type: {0}")]
    UnknownEndpointType(String),

    /// Utility error
    #[error("Utility error: {0}")]
    Util(#[from] paymigrate_utils::UtilError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
