//! Sequential bulk migration
//!
//! Endpoints are migrated one at a time, in order. Two endpoints in the same
//! file must never be in flight together, since each one relies on locating
//! its snippet in the live file. Cancellation is polled between endpoints.

use crate::{
    cancellation::CancellationToken,
    engine::{EngineConfig, MigrationEngine},
    transformers::LiveValidator,
    types::{
        BulkFailure, BulkMigrationOptions, BulkMigrationResult, BulkSummary, MigrationOptions, MigrationProgress,
        ProgressCallback,
    },
    Result, TransformError,
};
use paymigrate_core::DetectedEndpoint;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on live-validated results per run, whatever the config says
const MAX_LIVE_SAMPLES: usize = 3;

pub struct BulkCoordinator {
    sample_size: usize,
    live_validator: Option<Arc<dyn LiveValidator>>,
}

impl BulkCoordinator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sample_size: config.bulk_sample_size,
            live_validator: None,
        }
    }

    /// Smoke-test a sample of successful results after each run
    pub fn with_live_validator(mut self, validator: Arc<dyn LiveValidator>) -> Self {
        self.live_validator = Some(validator);
        self
    }

    /// Migrate `endpoints` in order.
    ///
    /// With `stop_on_error` the first failure is returned as
    /// [`TransformError::BulkAborted`] and the remaining endpoints are never
    /// attempted. Otherwise failures are collected and the run continues.
    pub async fn run(
        &self,
        engine: &mut MigrationEngine,
        endpoints: &[DetectedEndpoint],
        options: &BulkMigrationOptions,
        cancellation: &CancellationToken,
        mut progress: Option<ProgressCallback<'_>>,
    ) -> Result<BulkMigrationResult> {
        let started = Instant::now();
        let total = endpoints.len();
        let per_endpoint = MigrationOptions {
            validate: options.validate_after_migration,
            create_backup: false,
        };
        let mut result = BulkMigrationResult {
            total_endpoints: total,
            ..BulkMigrationResult::default()
        };
        let mut backed_up: HashSet<&str> = HashSet::new();

        info!("Starting bulk migration of {} endpoint(s)", total);

        for (index, endpoint) in endpoints.iter().enumerate() {
            if cancellation.is_cancelled() {
                info!("Bulk migration cancelled after {} of {} endpoint(s)", index, total);
                result.cancelled = true;
                break;
            }

            let mut backup_id = None;
            if options.create_backup && !backed_up.contains(endpoint.file_path.as_str()) {
                match engine
                    .backups_mut()
                    .create_backup(Path::new(&endpoint.file_path), None, Some("before bulk migration"))
                    .await
                {
                    Ok(backup) => {
                        backed_up.insert(endpoint.file_path.as_str());
                        backup_id = Some(backup.id);
                    }
                    Err(e) => {
                        Self::record_failure(&mut result, endpoint, e.to_string(), options.stop_on_error)?;
                        continue;
                    }
                }
            }

            let position = index + 1;
            let mut forward = |p: &MigrationProgress| {
                if let Some(callback) = progress.as_deref_mut() {
                    callback(&MigrationProgress {
                        phase: p.phase,
                        percent: p.percent,
                        message: format!("[{position}/{total}] {}", p.message),
                    });
                }
            };
            let mut migration = engine
                .migrate_endpoint(endpoint, &per_endpoint, Some(&mut forward))
                .await;
            if migration.metadata.backup_id.is_none() {
                migration.metadata.backup_id = backup_id;
            }

            if migration.success {
                result.successful_migrations += 1;
                result.results.push(migration);
            } else {
                let error = migration.error.clone().unwrap_or_default();
                result.results.push(migration);
                Self::record_failure(&mut result, endpoint, error, options.stop_on_error)?;
            }
        }

        result.success = result.failed_migrations == 0;
        result.summary = Self::summarize(&result, started);

        if options.validate_after_migration && result.successful_migrations > 0 {
            self.validate_sample(&mut result).await;
        }

        info!(
            "Bulk migration finished: {} succeeded, {} failed, {} not attempted",
            result.successful_migrations,
            result.failed_migrations,
            total - result.successful_migrations - result.failed_migrations
        );
        Ok(result)
    }

    fn record_failure(
        result: &mut BulkMigrationResult,
        endpoint: &DetectedEndpoint,
        error: String,
        stop_on_error: bool,
    ) -> Result<()> {
        result.failed_migrations += 1;
        result.errors.push(BulkFailure {
            endpoint_id: endpoint.id.clone(),
            file_path: endpoint.file_path.clone(),
            line_number: endpoint.line_number,
            error: error.clone(),
        });

        if stop_on_error {
            warn!("Stopping bulk migration at endpoint {}: {}", endpoint.id, error);
            return Err(TransformError::BulkAborted {
                endpoint_id: endpoint.id.clone(),
                error,
            });
        }
        Ok(())
    }

    fn summarize(result: &BulkMigrationResult, started: Instant) -> BulkSummary {
        let successes: Vec<_> = result.results.iter().filter(|r| r.success).collect();
        let average_confidence = if successes.is_empty() {
            0.0
        } else {
            successes.iter().map(|r| r.metadata.confidence).sum::<f64>() / successes.len() as f64
        };
        let files_touched = successes
            .iter()
            .map(|r| r.metadata.file_path.as_str())
            .collect::<HashSet<_>>()
            .len();

        BulkSummary {
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            average_confidence,
            files_touched,
        }
    }

    /// Live-validate up to `sample_size` (at most three) successful results;
    /// never affects success
    async fn validate_sample(&self, result: &mut BulkMigrationResult) {
        let Some(validator) = &self.live_validator else {
            debug!("No live validator attached, skipping sample validation");
            return;
        };
        if !validator.is_configured() {
            debug!("Live validator not configured, skipping sample validation");
            return;
        }

        let mut reports = Vec::new();
        let sample = self.sample_size.min(MAX_LIVE_SAMPLES);
        for migration in result.results.iter().filter(|r| r.success).take(sample) {
            match validator.validate(migration).await {
                Ok(report) => {
                    if !report.passed {
                        warn!(
                            "Live validation failed for migration {}: {}",
                            report.migration_id, report.message
                        );
                    }
                    reports.push(report);
                }
                Err(e) => warn!(
                    "Live validation errored for migration {}: {}",
                    migration.metadata.migration_id, e
                ),
            }
        }
        result.sample_validations = reports;
    }
}
