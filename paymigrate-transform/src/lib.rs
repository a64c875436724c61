//! paymigrate transform - migration pipeline for SourcePay call sites
//!
//! This crate turns detected endpoints into applied migrations:
//! - Transformer and live-validation contracts for external collaborators
//! - The per-endpoint migration state machine and the sequential bulk loop
//! - Heuristic validation of transformer output
//! - Hash-verified file backups and a capped, exportable migration history

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bulk;
pub mod cancellation;
pub mod engine;
pub mod export;
pub mod history;
pub mod rollback;
pub mod transformers;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use bulk::BulkCoordinator;
pub use cancellation::CancellationToken;
pub use engine::{EngineConfig, MigrationEngine};
pub use export::{analyze_results, export_history, ExportFormat, ResultsAnalysis};
pub use history::{HistoryStatistics, HistoryStore};
pub use rollback::{BackupManager, BackupMetadata, BackupStatistics};
pub use transformers::{CodeTransformer, LiveValidator};
pub use types::{
    BulkMigrationOptions, BulkMigrationResult, MigrationHistoryEntry, MigrationOptions, MigrationPhase,
    MigrationProgress, MigrationResult, TransformationRequest, TransformationResponse,
};
pub use validation::{ResponseValidator, ValidationInput, ValidationOutcome};

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, TransformError>;

/// Error types for migration operations
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Endpoint type has no entry in the mapping dictionary
    #[error("no mapping for endpoint type: {0}")]
    NoMapping(String),

    /// Export or import format not recognized
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Transformer reported failure or returned no code
    #[error("code generation failed: {0}")]
    Generation(String),

    /// Live file no longer matches what was detected
    #[error("could not locate original code: {0}")]
    Drift(String),

    /// Backup creation failed
    #[error("Backup error: {0}")]
    Backup(String),

    /// Rollback error
    #[error("Rollback error: {0}")]
    Rollback(String),

    /// History or backup metadata could not be persisted
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Imported history document has the wrong shape
    #[error("Invalid import: {0}")]
    InvalidImport(String),

    /// Bulk run stopped at the first failure
    #[error("bulk migration aborted at endpoint {endpoint_id}: {error}")]
    BulkAborted { endpoint_id: String, error: String },

    /// paymigrate core error
    #[error("Core error: {0}")]
    Core(#[from] paymigrate_core::Error),

    /// Utility error
    #[error("Utility error: {0}")]
    Util(#[from] paymigrate_utils::UtilError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
