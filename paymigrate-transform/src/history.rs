//! Migration history store
//!
//! A capped list of [`MigrationHistoryEntry`] records, newest first. Entries
//! are inserted at the head, so eviction drops whatever was inserted
//! earliest regardless of timestamps. Statistics are derived on every call.

use crate::types::MigrationHistoryEntry;
use crate::{Result, TransformError};
use chrono::{DateTime, Utc};
use paymigrate_core::EndpointType;
use paymigrate_utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
const SCHEMA_VERSION: u32 = 1;
/// Credit per successful entry in the history-level average confidence
const SUCCESS_CONFIDENCE_CREDIT: f64 = 0.8;
const TOP_ENDPOINT_TYPES: usize = 5;
const RECENT_ENTRIES: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryDocument {
    schema_version: u32,
    export_date: DateTime<Utc>,
    migrations: Vec<MigrationHistoryEntry>,
}

/// Aggregates over the stored history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStatistics {
    pub total_migrations: usize,
    pub successful_migrations: usize,
    pub failed_migrations: usize,
    /// Success proxy: 0.8 per success, 0 per failure, averaged
    pub average_confidence: f64,
    /// At most five, most frequent first
    pub most_common_endpoint_types: Vec<(EndpointType, usize)>,
    /// At most ten, newest first
    pub recent_migrations: Vec<MigrationHistoryEntry>,
}

#[derive(Debug)]
pub struct HistoryStore {
    /// `None` keeps the store purely in memory
    path: Option<PathBuf>,
    capacity: usize,
    entries: Vec<MigrationHistoryEntry>,
}

impl HistoryStore {
    /// Load the history document at `path`; missing or corrupt means empty
    pub async fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let mut entries = Self::load(&path).await;
        entries.truncate(capacity);
        debug!("Loaded {} history entries from {}", entries.len(), path.display());

        Self {
            path: Some(path),
            capacity,
            entries,
        }
    }

    pub fn in_memory(capacity: usize) -> Self {
        Self {
            path: None,
            capacity,
            entries: Vec::new(),
        }
    }

    async fn load(path: &Path) -> Vec<MigrationHistoryEntry> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot read migration history {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<HistoryDocument>(&json) {
            Ok(document) => document.migrations,
            Err(e) => {
                warn!("Ignoring corrupt migration history {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the head, evict beyond capacity and persist
    pub async fn add_entry(&mut self, entry: MigrationHistoryEntry) {
        debug!("Recording migration {} (success: {})", entry.id, entry.success);
        self.entries.insert(0, entry);
        self.entries.truncate(self.capacity);
        self.persist().await;
    }

    /// Newest first
    pub fn get_migration_history(&self) -> &[MigrationHistoryEntry] {
        &self.entries
    }

    pub fn find(&self, id: &str) -> Option<&MigrationHistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn statistics(&self) -> HistoryStatistics {
        let total = self.entries.len();
        let successful = self.entries.iter().filter(|e| e.success).count();

        let mut counts: HashMap<EndpointType, usize> = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.endpoint_type).or_insert(0) += 1;
        }
        let mut most_common: Vec<(EndpointType, usize)> = counts.into_iter().collect();
        most_common.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        most_common.truncate(TOP_ENDPOINT_TYPES);

        let average_confidence = if total == 0 {
            0.0
        } else {
            successful as f64 * SUCCESS_CONFIDENCE_CREDIT / total as f64
        };

        HistoryStatistics {
            total_migrations: total,
            successful_migrations: successful,
            failed_migrations: total - successful,
            average_confidence,
            most_common_endpoint_types: most_common,
            recent_migrations: self.entries.iter().take(RECENT_ENTRIES).cloned().collect(),
        }
    }

    /// Serialize the whole history as a versioned JSON document
    pub fn export_migration_history(&self) -> Result<String> {
        let document = HistoryDocument {
            schema_version: SCHEMA_VERSION,
            export_date: Utc::now(),
            migrations: self.entries.clone(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Replace the history with an exported document.
    ///
    /// The document is validated as a whole first; on any error the current
    /// history is left untouched.
    pub async fn import_migration_history(&mut self, json: &str) -> Result<usize> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| TransformError::InvalidImport(format!("not JSON: {e}")))?;

        let migrations = value
            .get("migrations")
            .filter(|m| m.is_array())
            .cloned()
            .ok_or_else(|| TransformError::InvalidImport("expected a `migrations` array".to_string()))?;

        let mut entries: Vec<MigrationHistoryEntry> = serde_json::from_value(migrations)
            .map_err(|e| TransformError::InvalidImport(format!("malformed migration entry: {e}")))?;
        entries.truncate(self.capacity);

        let count = entries.len();
        self.entries = entries;
        self.persist().await;

        info!("Imported {} migration history entries", count);
        Ok(count)
    }

    pub async fn clear(&mut self) {
        self.entries.clear();
        self.persist().await;
    }

    /// Write the history document; failures are logged and state is kept
    pub async fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let result = match self.export_migration_history() {
            Ok(json) => write_atomic(path, json.as_bytes()).await.map_err(TransformError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                "{}",
                TransformError::Persistence(format!("migration history {}: {e}", path.display()))
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RollbackPayload;
    use tempfile::TempDir;

    fn entry(id: &str, endpoint_type: EndpointType, success: bool) -> MigrationHistoryEntry {
        MigrationHistoryEntry {
            id: id.to_string(),
            timestamp: Utc::now(),
            file_path: "src/pay.js".to_string(),
            line_number: 1,
            endpoint_type,
            original_code: "ssl_amount".to_string(),
            migrated_code: if success { "amount.total".to_string() } else { String::new() },
            success,
            error: (!success).then(|| "code generation failed: timeout".to_string()),
            rollback: success.then(|| RollbackPayload::capture(b"ssl_amount".to_vec())),
        }
    }

    #[tokio::test]
    async fn test_history_is_capped_newest_first() {
        let mut store = HistoryStore::in_memory(DEFAULT_HISTORY_CAPACITY);
        for i in 0..105 {
            store.add_entry(entry(&format!("m-{i}"), EndpointType::Checkout, true)).await;
        }

        let history = store.get_migration_history();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].id, "m-104");
        assert_eq!(history[99].id, "m-5");
        assert!(store.find("m-4").is_none());
    }

    #[tokio::test]
    async fn test_statistics() {
        let mut store = HistoryStore::in_memory(DEFAULT_HISTORY_CAPACITY);
        store.add_entry(entry("a", EndpointType::Checkout, true)).await;
        store.add_entry(entry("b", EndpointType::ProcessTransaction, true)).await;
        store.add_entry(entry("c", EndpointType::ProcessTransaction, false)).await;
        store.add_entry(entry("d", EndpointType::ProcessTransaction, true)).await;

        let stats = store.statistics();
        assert_eq!(stats.total_migrations, 4);
        assert_eq!(stats.successful_migrations, 3);
        assert_eq!(stats.failed_migrations, 1);
        assert!((stats.average_confidence - 0.6).abs() < 1e-9);
        assert_eq!(
            stats.most_common_endpoint_types,
            vec![(EndpointType::ProcessTransaction, 3), (EndpointType::Checkout, 1)]
        );
        assert_eq!(stats.recent_migrations[0].id, "d");

        let empty = HistoryStore::in_memory(10).statistics();
        assert_eq!(empty.average_confidence, 0.0);
        assert!(empty.recent_migrations.is_empty());
    }

    #[tokio::test]
    async fn test_export_import_round_trip() -> Result<()> {
        let mut store = HistoryStore::in_memory(DEFAULT_HISTORY_CAPACITY);
        store.add_entry(entry("a", EndpointType::HostedPayments, true)).await;
        store.add_entry(entry("b", EndpointType::BatchProcessing, false)).await;
        let exported = store.export_migration_history()?;

        let mut restored = HistoryStore::in_memory(DEFAULT_HISTORY_CAPACITY);
        assert_eq!(restored.import_migration_history(&exported).await?, 2);

        let ids: Vec<(&str, bool)> = restored
            .get_migration_history()
            .iter()
            .map(|e| (e.id.as_str(), e.success))
            .collect();
        assert_eq!(ids, vec![("b", false), ("a", true)]);
        assert_eq!(restored.get_migration_history(), store.get_migration_history());

        let document: serde_json::Value = serde_json::from_str(&exported)?;
        assert_eq!(document["schemaVersion"], 1);
        assert!(document["exportDate"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_import_leaves_history_untouched() {
        let mut store = HistoryStore::in_memory(DEFAULT_HISTORY_CAPACITY);
        store.add_entry(entry("keep", EndpointType::Checkout, true)).await;

        for document in [
            "not json",
            r#"{"entries": []}"#,
            r#"{"migrations": {"id": "x"}}"#,
            r#"{"migrations": [{"id": "partial"}]}"#,
        ] {
            let result = store.import_migration_history(document).await;
            assert!(matches!(result, Err(TransformError::InvalidImport(_))), "{document}");
        }
        assert_eq!(store.get_migration_history().len(), 1);
        assert_eq!(store.get_migration_history()[0].id, "keep");
    }

    #[tokio::test]
    async fn test_persists_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("history.json");

        let mut store = HistoryStore::open(&path, DEFAULT_HISTORY_CAPACITY).await;
        assert!(store.get_migration_history().is_empty());
        store.add_entry(entry("a", EndpointType::Checkout, true)).await;
        store.add_entry(entry("b", EndpointType::Checkout, true)).await;

        let reopened = HistoryStore::open(&path, 1).await;
        assert_eq!(reopened.get_migration_history().len(), 1);
        assert_eq!(reopened.get_migration_history()[0].id, "b");

        store.clear().await;
        assert!(HistoryStore::open(&path, 10).await.get_migration_history().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_history_file_means_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let store = HistoryStore::open(&path, DEFAULT_HISTORY_CAPACITY).await;
        assert!(store.get_migration_history().is_empty());
    }
}
