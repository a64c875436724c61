//! Migration types and core data structures
//!
//! Requests and responses exchanged with the code transformer, per-endpoint
//! results, persisted history records and bulk aggregates.

use crate::validation::ValidationOutcome;
use chrono::{DateTime, Utc};
use paymigrate_core::content_hash_bytes;
use paymigrate_core::models::{EndpointType, Language};
use serde::{Deserialize, Serialize};
use similar::{DiffTag, TextDiff};

/// Phases of a single endpoint migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Analyzing,
    Generating,
    Validating,
    Applying,
    Complete,
    /// Terminal state reachable from every other phase
    Failed,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::Analyzing => "analyzing",
            MigrationPhase::Generating => "generating",
            MigrationPhase::Validating => "validating",
            MigrationPhase::Applying => "applying",
            MigrationPhase::Complete => "complete",
            MigrationPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Complete | MigrationPhase::Failed)
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    pub phase: MigrationPhase,
    /// 0 to 100
    pub percent: u8,
    pub message: String,
}

/// Progress observer invoked on every phase transition
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(&MigrationProgress) + Send);

/// Request handed to the external code transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationRequest {
    /// Original snippet, exactly as detected
    pub code: String,
    pub language: Language,
    pub endpoint_type: EndpointType,
    /// Flattened field-mapping rules
    pub mapping_rules: Vec<String>,
    /// Lines around the snippet
    pub surrounding_code: String,
}

/// Transformer reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationResponse {
    pub success: bool,
    #[serde(default)]
    pub code: Option<String>,
    /// Transformer's own confidence, if it reports one
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TransformationResponse {
    pub fn success(code: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            success: true,
            code: Some(code.into()),
            confidence,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            code: None,
            confidence: None,
            error: Some(error.into()),
        }
    }
}

/// Line-level change counts between two snippets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiff {
    pub added: usize,
    pub removed: usize,
    /// Lines replaced in place
    pub modified: usize,
}

impl LineDiff {
    pub fn compute(original: &str, migrated: &str) -> Self {
        let diff = TextDiff::from_lines(original, migrated);
        let mut line_diff = LineDiff::default();

        for op in diff.ops() {
            let old_len = op.old_range().len();
            let new_len = op.new_range().len();
            match op.tag() {
                DiffTag::Equal => {}
                DiffTag::Insert => line_diff.added += new_len,
                DiffTag::Delete => line_diff.removed += old_len,
                DiffTag::Replace => {
                    line_diff.modified += old_len.min(new_len);
                    line_diff.added += new_len.saturating_sub(old_len);
                    line_diff.removed += old_len.saturating_sub(new_len);
                }
            }
        }
        line_diff
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.modified == 0
    }
}

/// Metadata attached to every migration attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationMetadata {
    pub migration_id: String,
    pub endpoint_type: EndpointType,
    /// Field-coverage confidence in [0, 1]
    pub confidence: f64,
    pub elapsed_ms: u64,
    pub file_path: String,
    pub line_number: usize,
    #[serde(default)]
    pub backup_id: Option<String>,
}

/// Outcome of one endpoint migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub success: bool,
    pub original_code: String,
    /// Empty when generation failed
    pub migrated_code: String,
    pub diff: LineDiff,
    #[serde(default)]
    pub validation: Option<ValidationOutcome>,
    pub metadata: MigrationMetadata,
    #[serde(default)]
    pub error: Option<String>,
}

impl MigrationResult {
    /// Whether the validator asked for human review
    pub fn review_required(&self) -> bool {
        self.validation.as_ref().is_some_and(|v| v.review_required)
    }
}

/// Pre-migration file content kept for rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPayload {
    /// File text; lossily decoded when the file is not valid UTF-8
    pub original_content: String,
    /// xxh3 of the exact original bytes
    pub content_hash: String,
    /// Exact bytes, only for files that are not valid UTF-8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_bytes: Option<Vec<u8>>,
}

impl RollbackPayload {
    /// Capture a file's bytes so they can be written back exactly
    pub fn capture(bytes: Vec<u8>) -> Self {
        let content_hash = content_hash_bytes(&bytes);
        match String::from_utf8(bytes) {
            Ok(original_content) => Self {
                original_content,
                content_hash,
                original_bytes: None,
            },
            Err(e) => Self {
                original_content: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                content_hash,
                original_bytes: Some(e.into_bytes()),
            },
        }
    }

    /// The bytes a rollback writes
    pub fn bytes(&self) -> &[u8] {
        self.original_bytes
            .as_deref()
            .unwrap_or_else(|| self.original_content.as_bytes())
    }
}

/// Persisted record of one migration attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationHistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub file_path: String,
    pub line_number: usize,
    pub endpoint_type: EndpointType,
    pub original_code: String,
    pub migrated_code: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Always present on successful entries
    #[serde(default)]
    pub rollback: Option<RollbackPayload>,
}

/// Options for a single migration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Run the response validator on the generated code
    pub validate: bool,
    /// Back up the file before applying
    pub create_backup: bool,
}

/// Policy knobs for a bulk run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkMigrationOptions {
    pub validate_after_migration: bool,
    /// Back up each distinct file once, before its first migration
    pub create_backup: bool,
    /// Abort on the first failure instead of collecting it
    pub stop_on_error: bool,
}

/// A failed endpoint within a bulk run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub endpoint_id: String,
    pub file_path: String,
    pub line_number: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub elapsed_ms: u64,
    /// Mean field-coverage confidence of successful migrations
    pub average_confidence: f64,
    pub files_touched: usize,
}

/// Result of a live smoke test against the target API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveValidationReport {
    pub migration_id: String,
    pub passed: bool,
    pub message: String,
}

/// Aggregate outcome of a bulk run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkMigrationResult {
    /// True iff no endpoint failed
    pub success: bool,
    pub total_endpoints: usize,
    pub successful_migrations: usize,
    pub failed_migrations: usize,
    pub results: Vec<MigrationResult>,
    pub errors: Vec<BulkFailure>,
    pub summary: BulkSummary,
    /// Stopped early by cancellation
    pub cancelled: bool,
    pub sample_validations: Vec<LiveValidationReport>,
}
