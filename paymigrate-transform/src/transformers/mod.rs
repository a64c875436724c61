//! Contracts for external collaborators
//!
//! The migration pipeline never generates code itself. It hands a
//! [`TransformationRequest`] to a [`CodeTransformer`] and, after bulk runs,
//! optionally smoke-tests results through a [`LiveValidator`].

use crate::{
    types::{LiveValidationReport, MigrationResult, TransformationRequest, TransformationResponse},
    Result,
};
use async_trait::async_trait;

pub mod rule_based;

pub use rule_based::RuleBasedTransformer;

/// Produces target-API code for a source snippet
#[async_trait]
pub trait CodeTransformer: Send + Sync {
    /// Transform one snippet.
    ///
    /// A non-success response and an `Err` are both treated as a failed
    /// generation phase by the engine.
    async fn transform(&self, request: &TransformationRequest) -> Result<TransformationResponse>;

    /// Name used in logs
    fn name(&self) -> &str {
        "code-transformer"
    }
}

/// Smoke-tests migrated code against a live target
#[async_trait]
pub trait LiveValidator: Send + Sync {
    /// Whether credentials and configuration allow live calls
    fn is_configured(&self) -> bool;

    async fn validate(&self, result: &MigrationResult) -> Result<LiveValidationReport>;
}
