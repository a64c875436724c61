//! End-to-end tests: detect, migrate, record and roll back

use async_trait::async_trait;
use paymigrate_core::models::{EndpointType, Language};
use paymigrate_core::{content_hash, Detector, DetectedEndpoint, MappingDictionary, MappingResolver};
use paymigrate_transform::transformers::RuleBasedTransformer;
use paymigrate_transform::types::{BulkMigrationOptions, MigrationHistoryEntry, MigrationOptions};
use paymigrate_transform::{
    export_history, BulkCoordinator, CancellationToken, CodeTransformer, EngineConfig, ExportFormat, HistoryStore,
    MigrationEngine, Result, TransformationRequest, TransformationResponse,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const SCENARIO_A: &str =
    r#"fetch("https://api.sourcepay.com/hosted-payments/transaction_token", {ssl_account_id:"1", ssl_pin:"2"})"#;

fn engine_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        backup_directory: dir.path().join(".paymigrate").join("backups"),
        history_file: Some(dir.path().join(".paymigrate").join("history.json")),
        ..EngineConfig::default()
    }
}

fn builtin_dictionary() -> Arc<MappingDictionary> {
    Arc::new(MappingDictionary::builtin().expect("bundled dictionary parses"))
}

/// Simulates a concurrent edit: rewrites the target file mid-generation
struct ConcurrentEditTransformer {
    path: PathBuf,
    replacement: String,
}

#[async_trait]
impl CodeTransformer for ConcurrentEditTransformer {
    async fn transform(&self, _request: &TransformationRequest) -> Result<TransformationResponse> {
        tokio::fs::write(&self.path, &self.replacement).await?;
        Ok(TransformationResponse::success("fetch(RELAYPAY_URL, body)", Some(0.9)))
    }
}

#[tokio::test]
async fn scenario_a_detect_then_migrate() -> Result<()> {
    let dir = TempDir::new()?;
    let file = dir.path().join("checkout.js");
    let content = format!("// legacy checkout\n{SCENARIO_A}\n");
    std::fs::write(&file, &content)?;

    let endpoints = Detector::default().scan_source(&file.to_string_lossy(), &content, Language::JavaScript);
    assert_eq!(endpoints.len(), 1);
    let endpoint = &endpoints[0];
    assert_eq!(endpoint.endpoint_type, EndpointType::HostedPayments);
    assert_eq!(endpoint.line_number, 2);
    assert_eq!(endpoint.code, SCENARIO_A);
    assert!(endpoint.ssl_fields.contains(&"ssl_account_id".to_string()));
    assert!(endpoint.ssl_fields.contains(&"ssl_pin".to_string()));
    assert!(endpoint.confidence >= 0.7);
    assert_eq!(endpoint.content_hash.as_deref(), Some(content_hash(&content).as_str()));

    let transformer = Arc::new(RuleBasedTransformer::new(builtin_dictionary()));
    let mut engine = MigrationEngine::new(engine_config(&dir), MappingResolver::builtin()?, transformer).await?;
    let options = MigrationOptions {
        validate: true,
        create_backup: true,
    };
    let result = engine.migrate_endpoint(endpoint, &options, None).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        std::fs::read_to_string(&file)?,
        "// legacy checkout\nfetch(\"https://api.relaypay.io/v1/payment-sessions\", {merchantAccountId:\"1\", apiKey:\"2\"})\n"
    );
    assert!((result.metadata.confidence - 0.8).abs() < 1e-9);
    assert!(result.validation.is_some());
    assert!(result.metadata.backup_id.is_some());

    assert!(engine.rollback_migration(&result.metadata.migration_id).await?);
    assert_eq!(std::fs::read_to_string(&file)?, content);
    Ok(())
}

#[tokio::test]
async fn scenario_b_bulk_collects_partial_failures() -> Result<()> {
    let dir = TempDir::new()?;
    let dictionary = MappingDictionary::from_json_str(
        r#"{
            "version": "test",
            "commonFields": { "ssl_account_id": { "destination": "merchantAccountId" } },
            "mappings": {
                "hosted_payments": {
                    "sourceEndpoint": "/hosted-payments/transaction_token",
                    "destinationEndpoint": "/v1/payment-sessions",
                    "method": "POST"
                },
                "checkout": {
                    "sourceEndpoint": "/checkout.js",
                    "destinationEndpoint": "/v1/checkout/sdk.js",
                    "method": "GET"
                }
            }
        }"#,
    )?;

    let types = [EndpointType::HostedPayments, EndpointType::BatchProcessing, EndpointType::Checkout];
    let mut endpoints = Vec::new();
    for (i, endpoint_type) in types.into_iter().enumerate() {
        let path = dir.path().join(format!("pay{i}.js"));
        let line = format!("send({{ ssl_account_id: account{i} }});");
        std::fs::write(&path, format!("{line}\n"))?;
        endpoints.push(DetectedEndpoint::new(
            path.to_string_lossy(),
            1,
            endpoint_type,
            line,
            vec!["ssl_account_id".to_string()],
            Language::JavaScript,
            0.8,
        ));
    }

    let transformer = Arc::new(RuleBasedTransformer::new(Arc::new(dictionary.clone())));
    let mut engine = MigrationEngine::new(engine_config(&dir), MappingResolver::new(dictionary), transformer).await?;
    let coordinator = BulkCoordinator::new(engine.config());

    let options = BulkMigrationOptions {
        stop_on_error: false,
        ..BulkMigrationOptions::default()
    };
    let result = coordinator
        .run(&mut engine, &endpoints, &options, &CancellationToken::new(), None)
        .await?;

    assert_eq!(result.total_endpoints, 3);
    assert_eq!(result.successful_migrations, 2);
    assert_eq!(result.failed_migrations, 1);
    assert!(!result.success);
    assert_eq!(result.errors[0].endpoint_id, endpoints[1].id);
    assert!(result.errors[0].error.contains("no mapping for endpoint type"));
    assert_eq!(result.summary.files_touched, 2);

    // Configuration failures are never recorded
    assert_eq!(engine.history().get_migration_history().len(), 2);
    assert!(std::fs::read_to_string(&endpoints[1].file_path)?.contains("ssl_account_id"));
    Ok(())
}

#[tokio::test]
async fn scenario_c_drift_leaves_file_untouched() -> Result<()> {
    let dir = TempDir::new()?;
    let file = dir.path().join("legacy.js");
    std::fs::write(&file, format!("{SCENARIO_A}\n"))?;

    let endpoint = DetectedEndpoint::new(
        file.to_string_lossy(),
        1,
        EndpointType::HostedPayments,
        SCENARIO_A,
        vec!["ssl_account_id".to_string(), "ssl_pin".to_string()],
        Language::JavaScript,
        0.9,
    );
    let edited = "// rewritten by a teammate\nfetch(process.env.GATEWAY_URL, body)\n";
    let transformer = Arc::new(ConcurrentEditTransformer {
        path: file.clone(),
        replacement: edited.to_string(),
    });
    let mut engine = MigrationEngine::new(engine_config(&dir), MappingResolver::builtin()?, transformer).await?;

    let options = MigrationOptions {
        validate: false,
        create_backup: true,
    };
    let result = engine.migrate_endpoint(&endpoint, &options, None).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or_default().contains("could not locate"));
    assert_eq!(std::fs::read_to_string(&file)?, edited);
    assert!(!engine.history().get_migration_history().iter().any(|e| e.success));

    // Taken right before Applying, so it holds the edited file and stays valid
    let backup = engine.backups().latest_backup(&file).expect("backup was taken");
    assert_eq!(std::fs::read_to_string(&backup.backup_path)?, edited);
    assert!(engine.backups().restore(backup).await);
    Ok(())
}

#[tokio::test]
async fn scenario_d_history_is_capped() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("history.json");
    let mut store = HistoryStore::open(&path, 100).await;

    for i in 0..105 {
        store
            .add_entry(MigrationHistoryEntry {
                id: format!("migration-{i}"),
                timestamp: chrono::Utc::now(),
                file_path: "src/pay.js".to_string(),
                line_number: i,
                endpoint_type: EndpointType::ProcessTransaction,
                original_code: "ssl_amount".to_string(),
                migrated_code: "amount.total".to_string(),
                success: true,
                error: None,
                rollback: None,
            })
            .await;
    }

    let history = store.get_migration_history();
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].id, "migration-104");

    let reopened = HistoryStore::open(&path, 100).await;
    assert_eq!(reopened.get_migration_history().len(), 100);
    assert_eq!(reopened.get_migration_history()[0].id, "migration-104");
    Ok(())
}

#[tokio::test]
async fn scan_directory_and_bulk_migrate() -> Result<()> {
    let dir = TempDir::new()?;
    let src = dir.path().join("src");
    std::fs::create_dir_all(src.join("node_modules"))?;
    std::fs::write(src.join("checkout.js"), format!("{SCENARIO_A}\n"))?;
    std::fs::write(
        src.join("billing.py"),
        "import requests\nrequests.post('https://api.sourcepay.com/processxml.do', data={'ssl_amount': total})\n",
    )?;
    std::fs::write(src.join("node_modules").join("vendor.js"), format!("{SCENARIO_A}\n"))?;

    let endpoints = Detector::default().scan_directory(&src, &paymigrate_utils::default_exclusion_patterns())?;
    assert!(endpoints.len() >= 2);
    assert!(endpoints.iter().all(|e| !e.file_path.contains("node_modules")));

    let transformer = Arc::new(RuleBasedTransformer::new(builtin_dictionary()));
    let mut engine = MigrationEngine::new(engine_config(&dir), MappingResolver::builtin()?, transformer).await?;
    let result = BulkCoordinator::new(engine.config())
        .run(
            &mut engine,
            &endpoints,
            &BulkMigrationOptions {
                create_backup: true,
                ..BulkMigrationOptions::default()
            },
            &CancellationToken::new(),
            None,
        )
        .await?;

    assert!(result.successful_migrations >= 2);
    assert!(!std::fs::read_to_string(src.join("checkout.js"))?.contains("sourcepay.com"));
    assert!(std::fs::read_to_string(src.join("node_modules").join("vendor.js"))?.contains("sourcepay.com"));
    assert_eq!(engine.backups().statistics().files_tracked, 2);

    let csv = export_history(engine.history().get_migration_history(), ExportFormat::Csv)?;
    assert_eq!(csv.lines().count(), engine.history().get_migration_history().len() + 1);

    let reopened = HistoryStore::open(dir.path().join(".paymigrate").join("history.json"), 100).await;
    assert_eq!(
        reopened.get_migration_history().len(),
        engine.history().get_migration_history().len()
    );
    Ok(())
}

#[tokio::test]
async fn latin1_source_file_is_detected_and_migrated() -> Result<()> {
    let dir = TempDir::new()?;
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src)?;
    let file = src.join("legacy.php");
    let mut original = b"<?php\n// paiement caf\xe9\n".to_vec();
    original.extend_from_slice(b"$r = post('https://api.sourcepay.com/processxml.do', ['ssl_amount' => $t]);\n");
    std::fs::write(&file, &original)?;

    let endpoints = Detector::default().scan_directory(&src, &paymigrate_utils::default_exclusion_patterns())?;
    assert_eq!(endpoints.len(), 1);

    let transformer = Arc::new(RuleBasedTransformer::new(builtin_dictionary()));
    let config = EngineConfig {
        strict_drift_check: true,
        ..engine_config(&dir)
    };
    let mut engine = MigrationEngine::new(config, MappingResolver::builtin()?, transformer).await?;
    let result = engine
        .migrate_endpoint(
            &endpoints[0],
            &MigrationOptions {
                validate: false,
                create_backup: true,
            },
            None,
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    let migrated = std::fs::read(&file)?;
    assert!(migrated.starts_with(b"<?php\n// paiement caf\xe9\n"));
    assert!(!String::from_utf8_lossy(&migrated).contains("sourcepay.com"));

    assert!(engine.rollback_migration(&result.metadata.migration_id).await?);
    assert_eq!(std::fs::read(&file)?, original);
    Ok(())
}
