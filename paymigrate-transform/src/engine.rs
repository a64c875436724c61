//! Migration engine
//!
//! Drives one detected endpoint through
//! `Analyzing -> Generating -> Validating? -> Applying -> Complete`, with
//! `Failed` reachable from every phase. The engine owns the resolver, the
//! validator, the backup manager and the history store; the code itself comes
//! from an injected [`CodeTransformer`].
//!
//! Applying is optimistic: the detected snippet must still be present
//! verbatim in the live file, otherwise the migration fails as drift and the
//! file is left untouched. Files are decoded the same lossy way the detector
//! decodes them, and the splice happens on raw bytes so bytes outside the
//! snippet survive even when the file is not valid UTF-8.

use crate::{
    history::HistoryStore,
    rollback::BackupManager,
    transformers::CodeTransformer,
    types::{
        LineDiff, MigrationHistoryEntry, MigrationMetadata, MigrationOptions, MigrationPhase, MigrationProgress,
        MigrationResult, ProgressCallback, RollbackPayload, TransformationRequest,
    },
    validation::{extract_code, ResponseValidator, ValidationInput, ValidationOutcome},
    Result, TransformError,
};
use chrono::Utc;
use paymigrate_core::{
    content_hash, content_hash_bytes, DetectedEndpoint, EndpointMapping, MappingDictionary, MappingResolver,
};
use paymigrate_utils::{decode_text_lossy, write_atomic, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BASE_CONFIDENCE: f64 = 0.5;
const FIELD_RICHNESS_STEP: f64 = 0.05;
const FIELD_RICHNESS_CAP: f64 = 0.3;
const FIELD_COVERAGE_WEIGHT: f64 = 0.2;

/// Configuration for the migration engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory for backup copies and their metadata
    pub backup_directory: PathBuf,
    /// History document; `None` keeps history in memory only
    pub history_file: Option<PathBuf>,
    pub max_history_entries: usize,
    pub max_backups_per_file: usize,
    /// Also fail when the file changed anywhere since detection
    pub strict_drift_check: bool,
    pub context_lines_before: usize,
    pub context_lines_after: usize,
    /// Successful results revalidated live after a bulk run
    pub bulk_sample_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for EngineConfig {
    fn from(pipeline: &PipelineConfig) -> Self {
        Self {
            backup_directory: pipeline.backup_directory.clone(),
            history_file: Some(pipeline.history_file.clone()),
            max_history_entries: pipeline.max_history_entries,
            max_backups_per_file: pipeline.max_backups_per_file,
            strict_drift_check: pipeline.strict_drift_check,
            context_lines_before: pipeline.context_lines_before,
            context_lines_after: pipeline.context_lines_after,
            bulk_sample_size: pipeline.bulk_sample_size,
        }
    }
}

/// Why a migration stopped, and whether the attempt belongs in history
struct PhaseFailure {
    error: TransformError,
    recorded: bool,
}

impl PhaseFailure {
    /// Configuration errors abort without touching history
    fn configuration(error: TransformError) -> Self {
        Self { error, recorded: false }
    }

    fn recorded(error: TransformError) -> Self {
        Self { error, recorded: true }
    }
}

/// State accumulated while an endpoint moves through the phases
struct Attempt {
    migration_id: String,
    migrated_code: String,
    validation: Option<ValidationOutcome>,
    backup_id: Option<String>,
    confidence: f64,
}

fn notify(progress: &mut Option<ProgressCallback<'_>>, phase: MigrationPhase, percent: u8, message: impl Into<String>) {
    let message = message.into();
    debug!("[{:>3}%] {}: {}", percent, phase, message);
    if let Some(callback) = progress.as_deref_mut() {
        callback(&MigrationProgress {
            phase,
            percent,
            message,
        });
    }
}

pub struct MigrationEngine {
    config: EngineConfig,
    resolver: MappingResolver,
    transformer: Arc<dyn CodeTransformer>,
    validator: ResponseValidator,
    backups: BackupManager,
    history: HistoryStore,
}

impl MigrationEngine {
    /// Open the backup store and history named by `config`
    pub async fn new(
        config: EngineConfig,
        resolver: MappingResolver,
        transformer: Arc<dyn CodeTransformer>,
    ) -> Result<Self> {
        let backups = BackupManager::open(&config.backup_directory).await?;
        let history = match &config.history_file {
            Some(path) => HistoryStore::open(path, config.max_history_entries).await,
            None => HistoryStore::in_memory(config.max_history_entries),
        };
        let validator = ResponseValidator::new(resolver.dictionary());

        info!(
            "Migration engine ready (transformer: {}, {} history entries)",
            transformer.name(),
            history.get_migration_history().len()
        );
        Ok(Self {
            config,
            resolver,
            transformer,
            validator,
            backups,
            history,
        })
    }

    /// Build an engine from the typed pipeline configuration
    pub async fn from_pipeline_config(pipeline: &PipelineConfig, transformer: Arc<dyn CodeTransformer>) -> Result<Self> {
        let dictionary = match &pipeline.mapping_dictionary {
            Some(path) => MappingDictionary::load(path)?,
            None => MappingDictionary::builtin()?,
        };
        Self::new(EngineConfig::from(pipeline), MappingResolver::new(dictionary), transformer).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryStore {
        &mut self.history
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn backups_mut(&mut self) -> &mut BackupManager {
        &mut self.backups
    }

    /// Hot-reload the mapping dictionary; the current one stays on failure
    pub fn reload_mappings(&mut self, path: &Path) -> Result<()> {
        self.resolver.reload(path)?;
        self.validator = ResponseValidator::new(self.resolver.dictionary());
        Ok(())
    }

    /// Apply the per-file retention policy from the configuration
    pub async fn cleanup_backups(&mut self) -> usize {
        self.backups.cleanup_old_backups(self.config.max_backups_per_file).await
    }

    /// Migrate one endpoint.
    ///
    /// Never returns an error: every failure is reported in the result.
    /// Failures after mapping resolution are also recorded in history.
    pub async fn migrate_endpoint(
        &mut self,
        endpoint: &DetectedEndpoint,
        options: &MigrationOptions,
        mut progress: Option<ProgressCallback<'_>>,
    ) -> MigrationResult {
        let started = Instant::now();
        let mut attempt = Attempt {
            migration_id: Uuid::new_v4().to_string(),
            migrated_code: String::new(),
            validation: None,
            backup_id: None,
            confidence: 0.0,
        };

        let outcome = self.run_phases(endpoint, options, &mut attempt, &mut progress).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(()) => {
                notify(&mut progress, MigrationPhase::Complete, 100, "Migration complete");
                info!(
                    "Migrated {} at {}:{} (confidence {:.2})",
                    endpoint.endpoint_type, endpoint.file_path, endpoint.line_number, attempt.confidence
                );
                Self::build_result(endpoint, attempt, elapsed_ms, None)
            }
            Err(failure) => {
                let error = failure.error.to_string();
                notify(&mut progress, MigrationPhase::Failed, 100, error.clone());
                warn!(
                    "Migration of {} at {}:{} failed: {}",
                    endpoint.endpoint_type, endpoint.file_path, endpoint.line_number, error
                );

                if failure.recorded {
                    self.history
                        .add_entry(MigrationHistoryEntry {
                            id: attempt.migration_id.clone(),
                            timestamp: Utc::now(),
                            file_path: endpoint.file_path.clone(),
                            line_number: endpoint.line_number,
                            endpoint_type: endpoint.endpoint_type,
                            original_code: endpoint.code.clone(),
                            migrated_code: attempt.migrated_code.clone(),
                            success: false,
                            error: Some(error.clone()),
                            rollback: None,
                        })
                        .await;
                }
                Self::build_result(endpoint, attempt, elapsed_ms, Some(error))
            }
        }
    }

    async fn run_phases(
        &mut self,
        endpoint: &DetectedEndpoint,
        options: &MigrationOptions,
        attempt: &mut Attempt,
        progress: &mut Option<ProgressCallback<'_>>,
    ) -> std::result::Result<(), PhaseFailure> {
        notify(
            progress,
            MigrationPhase::Analyzing,
            0,
            format!("Resolving mapping for {}", endpoint.endpoint_type.display_name()),
        );
        let mapping = self
            .resolver
            .resolve_mapping(endpoint.endpoint_type)
            .mapping()
            .cloned()
            .ok_or_else(|| PhaseFailure::configuration(TransformError::NoMapping(endpoint.endpoint_type.to_string())))?;
        let mapping_rules = self.resolver.flatten_rules(&mapping);

        notify(
            progress,
            MigrationPhase::Generating,
            20,
            format!("Requesting code from {}", self.transformer.name()),
        );
        let surrounding_code = match tokio::fs::read(&endpoint.file_path).await {
            Ok(bytes) => surrounding_context(
                &decode_text_lossy(&bytes),
                endpoint.line_number,
                endpoint.code.lines().count(),
                self.config.context_lines_before,
                self.config.context_lines_after,
            ),
            Err(e) => {
                warn!("No context for {}: {}", endpoint.file_path, e);
                String::new()
            }
        };
        let request = TransformationRequest {
            code: endpoint.code.clone(),
            language: endpoint.language,
            endpoint_type: endpoint.endpoint_type,
            mapping_rules,
            surrounding_code,
        };

        let response = self
            .transformer
            .transform(&request)
            .await
            .map_err(|e| PhaseFailure::recorded(TransformError::Generation(e.to_string())))?;
        if !response.success {
            let reason = response
                .error
                .unwrap_or_else(|| "transformer reported failure".to_string());
            return Err(PhaseFailure::recorded(TransformError::Generation(reason)));
        }
        let raw = response
            .code
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| PhaseFailure::recorded(TransformError::Generation("transformer returned no code".to_string())))?;
        let migrated = extract_code(&raw).ok_or_else(|| {
            PhaseFailure::recorded(TransformError::Generation("no code found in transformer response".to_string()))
        })?;
        attempt.migrated_code.clone_from(&migrated);

        if options.validate {
            notify(progress, MigrationPhase::Validating, 40, "Validating generated code");
            let outcome = self.validator.validate(&ValidationInput {
                raw_response: &raw,
                original_code: &endpoint.code,
                language: endpoint.language,
                endpoint_type: Some(endpoint.endpoint_type),
                transformer_confidence: response.confidence,
            });
            if outcome.review_required {
                info!(
                    "Migration {} needs review (validation confidence {:.2}, quality {})",
                    attempt.migration_id, outcome.confidence, outcome.quality.score
                );
            }
            attempt.validation = Some(outcome);
        }

        if options.create_backup {
            let backup = self
                .backups
                .create_backup(
                    Path::new(&endpoint.file_path),
                    Some(&attempt.migration_id),
                    Some("before migration"),
                )
                .await
                .map_err(PhaseFailure::recorded)?;
            attempt.backup_id = Some(backup.id);
        }

        notify(
            progress,
            MigrationPhase::Applying,
            70,
            format!("Applying to {}:{}", endpoint.file_path, endpoint.line_number),
        );
        let original_bytes = self
            .apply(endpoint, &migrated)
            .await
            .map_err(PhaseFailure::recorded)?;

        attempt.confidence = self.field_coverage_confidence(endpoint, &mapping);
        self.history
            .add_entry(MigrationHistoryEntry {
                id: attempt.migration_id.clone(),
                timestamp: Utc::now(),
                file_path: endpoint.file_path.clone(),
                line_number: endpoint.line_number,
                endpoint_type: endpoint.endpoint_type,
                original_code: endpoint.code.clone(),
                migrated_code: migrated,
                success: true,
                error: None,
                rollback: Some(RollbackPayload::capture(original_bytes)),
            })
            .await;
        Ok(())
    }

    /// Replace the detected snippet in the live file; returns the prior bytes
    async fn apply(&self, endpoint: &DetectedEndpoint, migrated: &str) -> Result<Vec<u8>> {
        let path = Path::new(&endpoint.file_path);
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| TransformError::Drift(format!("{} is unreadable: {e}", endpoint.file_path)))?;

        if self.config.strict_drift_check {
            if let Some(expected) = &endpoint.content_hash {
                if content_hash(&decode_text_lossy(&content)) != *expected {
                    return Err(TransformError::Drift(format!(
                        "{} changed since detection",
                        endpoint.file_path
                    )));
                }
            }
        }

        let snippet = endpoint.code.as_bytes();
        let start = locate_snippet(&content, snippet, endpoint.line_number).ok_or_else(|| {
            TransformError::Drift(format!("{}:{}", endpoint.file_path, endpoint.line_number))
        })?;

        let mut updated = Vec::with_capacity(content.len() + migrated.len());
        updated.extend_from_slice(&content[..start]);
        updated.extend_from_slice(migrated.as_bytes());
        updated.extend_from_slice(&content[start + snippet.len()..]);
        write_atomic(path, &updated).await?;

        Ok(content)
    }

    /// 0.5 + field richness (0.05 per field, up to 0.3) + 0.2 x fraction of fields with a rule
    fn field_coverage_confidence(&self, endpoint: &DetectedEndpoint, mapping: &EndpointMapping) -> f64 {
        let detected = endpoint.ssl_fields.len();
        if detected == 0 {
            return BASE_CONFIDENCE;
        }

        let covered = endpoint
            .ssl_fields
            .iter()
            .filter(|field| self.resolver.covers_field(mapping, field))
            .count();
        let richness = (FIELD_RICHNESS_STEP * detected as f64).min(FIELD_RICHNESS_CAP);
        let coverage = FIELD_COVERAGE_WEIGHT * covered as f64 / detected as f64;
        (BASE_CONFIDENCE + richness + coverage).clamp(0.0, 1.0)
    }

    fn build_result(
        endpoint: &DetectedEndpoint,
        attempt: Attempt,
        elapsed_ms: u64,
        error: Option<String>,
    ) -> MigrationResult {
        let diff = if attempt.migrated_code.is_empty() {
            LineDiff::default()
        } else {
            LineDiff::compute(&endpoint.code, &attempt.migrated_code)
        };

        MigrationResult {
            success: error.is_none(),
            original_code: endpoint.code.clone(),
            migrated_code: attempt.migrated_code,
            diff,
            validation: attempt.validation,
            metadata: MigrationMetadata {
                migration_id: attempt.migration_id,
                endpoint_type: endpoint.endpoint_type,
                confidence: attempt.confidence,
                elapsed_ms,
                file_path: endpoint.file_path.clone(),
                line_number: endpoint.line_number,
                backup_id: attempt.backup_id,
            },
            error,
        }
    }

    /// Restore the file content recorded before a successful migration.
    ///
    /// `Ok(false)` means bytes were written but the restored file does not
    /// hash to the recorded value; treat the file as being in an unknown state.
    pub async fn rollback_migration(&self, migration_id: &str) -> Result<bool> {
        let entry = self
            .history
            .find(migration_id)
            .ok_or_else(|| TransformError::Rollback(format!("no migration with id {migration_id}")))?;
        let payload = entry
            .rollback
            .as_ref()
            .ok_or_else(|| TransformError::Rollback(format!("migration {migration_id} has no rollback payload")))?;

        let path = Path::new(&entry.file_path);
        write_atomic(path, payload.bytes()).await?;
        let restored = tokio::fs::read(path).await?;

        let verified = content_hash_bytes(&restored) == payload.content_hash;
        if verified {
            info!("Rolled back migration {} in {}", migration_id, entry.file_path);
        } else {
            warn!(
                "Rollback of {} wrote {} but the content hash does not match",
                migration_id, entry.file_path
            );
        }
        Ok(verified)
    }

    /// Restore a file from one of its backups
    pub async fn restore_backup(&self, backup_id: &str) -> Result<bool> {
        let backup = self
            .backups
            .find(backup_id)
            .ok_or_else(|| TransformError::Rollback(format!("no backup with id {backup_id}")))?;
        Ok(self.backups.restore(backup).await)
    }
}

/// Byte offset of `snippet` in `content`, preferring the occurrence that
/// starts on `line_number` (1-based)
fn locate_snippet(content: &[u8], snippet: &[u8], line_number: usize) -> Option<usize> {
    if snippet.is_empty() || snippet.len() > content.len() {
        return None;
    }

    let mut first = None;
    let mut line = 1;
    let mut counted = 0;
    for offset in 0..=content.len() - snippet.len() {
        if !content[offset..].starts_with(snippet) {
            continue;
        }
        line += content[counted..offset].iter().filter(|&&b| b == b'\n').count();
        counted = offset;
        if line == line_number {
            return Some(offset);
        }
        first.get_or_insert(offset);
    }
    first
}

/// The snippet's lines plus `before` lines above and `after` lines below
fn surrounding_context(content: &str, line_number: usize, snippet_lines: usize, before: usize, after: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let first = line_number.saturating_sub(1).min(lines.len());
    let start = first.saturating_sub(before);
    let end = (first + snippet_lines.max(1) + after).min(lines.len());
    lines[start..end].join("\n")
}
