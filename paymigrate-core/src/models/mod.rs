//! Data models for detected source-API usage
//!
//! These types are produced by the detector and consumed, read-only, by the
//! mapping resolver and the migration engine.

pub mod detection;
pub mod endpoint;
pub mod language;

pub use detection::{
    CommentMatch, ConfigRefKind, ConfigReference, DetectionReport, EndpointMatch, FieldMatch,
    HttpCallMatch,
};
pub use endpoint::{DetectedEndpoint, EndpointType};
pub use language::Language;
