//! Backup and rollback manager
//!
//! Every backup is a timestamped copy of one file plus metadata recorded
//! under the original path. Restores are verified by re-hashing the restored
//! file; a mismatch is a failed restore even though bytes were written.
//! Metadata lives in one JSON document in the backup directory; a missing or
//! corrupt document means "no backups", never an error.

use crate::{Result, TransformError};
use chrono::{DateTime, Utc};
use paymigrate_core::content_hash_bytes;
use paymigrate_utils::{normalize_path, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const METADATA_FILE: &str = "backup-metadata.json";
const SCHEMA_VERSION: u32 = 1;

/// One stored copy of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub id: String,
    pub original_path: String,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// xxh3-64 of the backed-up bytes, lowercase hex
    pub content_hash: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub migration_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    schema_version: u32,
    last_updated: DateTime<Utc>,
    backups: BTreeMap<String, Vec<BackupMetadata>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatistics {
    pub total_backups: usize,
    pub files_tracked: usize,
    pub total_size_bytes: u64,
    pub oldest_backup: Option<DateTime<Utc>>,
    pub newest_backup: Option<DateTime<Utc>>,
}

/// Owns the backup directory and its metadata
#[derive(Debug)]
pub struct BackupManager {
    backup_directory: PathBuf,
    metadata_path: PathBuf,
    /// Original path -> backups, oldest first; never holds an empty bucket
    backups: BTreeMap<String, Vec<BackupMetadata>>,
}

impl BackupManager {
    /// Open (creating if needed) a backup directory and load its metadata
    pub async fn open(backup_directory: impl Into<PathBuf>) -> Result<Self> {
        let backup_directory = backup_directory.into();
        tokio::fs::create_dir_all(&backup_directory)
            .await
            .map_err(|e| TransformError::Backup(format!("cannot create {}: {e}", backup_directory.display())))?;

        let metadata_path = backup_directory.join(METADATA_FILE);
        let backups = Self::load_metadata(&metadata_path).await;
        debug!(
            "Loaded {} backup bucket(s) from {}",
            backups.len(),
            metadata_path.display()
        );

        Ok(Self {
            backup_directory,
            metadata_path,
            backups,
        })
    }

    async fn load_metadata(path: &Path) -> BTreeMap<String, Vec<BackupMetadata>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Cannot read backup metadata {}: {}", path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str::<MetadataDocument>(&json) {
            Ok(document) => document
                .backups
                .into_iter()
                .filter(|(_, bucket)| !bucket.is_empty())
                .collect(),
            Err(e) => {
                warn!("Ignoring corrupt backup metadata {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    pub fn backup_directory(&self) -> &Path {
        &self.backup_directory
    }

    fn key_for(path: &Path) -> String {
        normalize_path(path).to_string_lossy().into_owned()
    }

    /// Copy `path` into the backup store and record it
    pub async fn create_backup(
        &mut self,
        path: &Path,
        migration_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<BackupMetadata> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransformError::Backup(format!("cannot read {}: {e}", path.display())))?;

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let file_name = path
            .file_name()
            .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().into_owned());
        let backup_path = self.backup_directory.join(format!(
            "{}-{}-{}",
            created_at.format("%Y%m%dT%H%M%S%3f"),
            &id[..8],
            file_name
        ));

        tokio::fs::write(&backup_path, &bytes)
            .await
            .map_err(|e| TransformError::Backup(format!("cannot write {}: {e}", backup_path.display())))?;

        let metadata = BackupMetadata {
            id,
            original_path: Self::key_for(path),
            backup_path,
            created_at,
            content_hash: content_hash_bytes(&bytes),
            size_bytes: bytes.len() as u64,
            migration_id: migration_id.map(str::to_string),
            description: description.map(str::to_string),
        };

        self.backups
            .entry(metadata.original_path.clone())
            .or_default()
            .push(metadata.clone());
        self.persist().await;

        info!("Backed up {} as {}", metadata.original_path, metadata.id);
        Ok(metadata)
    }

    /// Copy a backup over its original and verify the result by hash.
    ///
    /// Never errors: any failure, including a hash mismatch, returns false.
    pub async fn restore(&self, metadata: &BackupMetadata) -> bool {
        let bytes = match tokio::fs::read(&metadata.backup_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read backup {}: {}", metadata.backup_path.display(), e);
                return false;
            }
        };

        let original = Path::new(&metadata.original_path);
        if let Err(e) = write_atomic(original, &bytes).await {
            warn!("Cannot restore {}: {}", metadata.original_path, e);
            return false;
        }

        match tokio::fs::read(original).await {
            Ok(restored) if content_hash_bytes(&restored) == metadata.content_hash => {
                info!("Restored {} from backup {}", metadata.original_path, metadata.id);
                true
            }
            Ok(_) => {
                warn!(
                    "Restored {} does not match backup hash {}; file state unknown",
                    metadata.original_path, metadata.content_hash
                );
                false
            }
            Err(e) => {
                warn!("Cannot verify restored {}: {}", metadata.original_path, e);
                false
            }
        }
    }

    /// Keep the newest `max_per_file` backups of each file; returns how many were deleted
    pub async fn cleanup_old_backups(&mut self, max_per_file: usize) -> usize {
        let mut removed = Vec::new();

        for bucket in self.backups.values_mut() {
            if bucket.len() <= max_per_file {
                continue;
            }
            bucket.reverse();
            bucket.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            removed.extend(bucket.split_off(max_per_file));
            bucket.reverse();
        }
        self.backups.retain(|_, bucket| !bucket.is_empty());

        if removed.is_empty() {
            return 0;
        }
        for metadata in &removed {
            Self::remove_backup_file(metadata).await;
        }
        self.persist().await;

        info!("Cleaned up {} old backup(s)", removed.len());
        removed.len()
    }

    /// Delete one backup; returns whether it existed
    pub async fn delete_backup(&mut self, id: &str) -> bool {
        let mut found = None;
        for bucket in self.backups.values_mut() {
            if let Some(index) = bucket.iter().position(|b| b.id == id) {
                found = Some(bucket.remove(index));
                break;
            }
        }
        self.backups.retain(|_, bucket| !bucket.is_empty());

        let Some(metadata) = found else {
            return false;
        };
        Self::remove_backup_file(&metadata).await;
        self.persist().await;
        true
    }

    /// Delete every backup; returns how many were deleted
    pub async fn delete_all_backups(&mut self) -> usize {
        let all: Vec<BackupMetadata> = std::mem::take(&mut self.backups).into_values().flatten().collect();
        for metadata in &all {
            Self::remove_backup_file(metadata).await;
        }
        self.persist().await;
        all.len()
    }

    async fn remove_backup_file(metadata: &BackupMetadata) {
        match tokio::fs::remove_file(&metadata.backup_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot delete backup file {}: {}", metadata.backup_path.display(), e),
        }
    }

    /// Backups of one file, oldest first
    pub fn backups_for(&self, path: &Path) -> &[BackupMetadata] {
        self.backups.get(&Self::key_for(path)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest_backup(&self, path: &Path) -> Option<&BackupMetadata> {
        self.backups_for(path).last()
    }

    pub fn find(&self, id: &str) -> Option<&BackupMetadata> {
        self.backups.values().flatten().find(|b| b.id == id)
    }

    /// Every backup, newest first
    pub fn all_backups(&self) -> Vec<&BackupMetadata> {
        let mut backups: Vec<&BackupMetadata> = self.backups.values().flatten().collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        backups
    }

    pub fn statistics(&self) -> BackupStatistics {
        let all = self.backups.values().flatten();
        BackupStatistics {
            total_backups: all.clone().count(),
            files_tracked: self.backups.len(),
            total_size_bytes: all.clone().map(|b| b.size_bytes).sum(),
            oldest_backup: all.clone().map(|b| b.created_at).min(),
            newest_backup: all.map(|b| b.created_at).max(),
        }
    }

    /// Write the metadata document; failures are logged and state is kept
    pub async fn persist(&self) {
        let document = MetadataDocument {
            schema_version: SCHEMA_VERSION,
            last_updated: Utc::now(),
            backups: self.backups.clone(),
        };

        let result = match serde_json::to_vec_pretty(&document) {
            Ok(json) => write_atomic(&self.metadata_path, &json).await.map_err(TransformError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(
                "{}",
                TransformError::Persistence(format!("backup metadata {}: {e}", self.metadata_path.display()))
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, BackupManager, PathBuf) {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::open(dir.path().join("backups")).await.unwrap();
        let file = dir.path().join("checkout.js");
        std::fs::write(&file, "loadSourcePay();\n").unwrap();
        (dir, manager, file)
    }

    #[tokio::test]
    async fn test_backup_and_restore() -> Result<()> {
        let (_dir, mut manager, file) = setup().await;

        let backup = manager.create_backup(&file, Some("m-1"), Some("before migration")).await?;
        assert_eq!(backup.size_bytes, 17);
        assert_eq!(backup.content_hash, content_hash_bytes(b"loadSourcePay();\n"));
        assert!(backup.backup_path.exists());

        std::fs::write(&file, "loadRelayPay();\n")?;
        assert!(manager.restore(&backup).await);
        assert_eq!(std::fs::read_to_string(&file)?, "loadSourcePay();\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_from_corrupted_backup_fails() -> Result<()> {
        let (_dir, mut manager, file) = setup().await;
        let backup = manager.create_backup(&file, None, None).await?;

        std::fs::write(&backup.backup_path, b"\x00garbage")?;
        assert!(!manager.restore(&backup).await);

        std::fs::remove_file(&backup.backup_path)?;
        assert!(!manager.restore(&backup).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_of_missing_file() {
        let (dir, mut manager, _file) = setup().await;
        let result = manager.create_backup(&dir.path().join("missing.js"), None, None).await;
        assert!(matches!(result, Err(TransformError::Backup(_))));
        assert_eq!(manager.statistics().total_backups, 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest_and_is_idempotent() -> Result<()> {
        let (_dir, mut manager, file) = setup().await;
        let mut ids = Vec::new();
        for i in 0..4 {
            std::fs::write(&file, format!("version {i}"))?;
            ids.push(manager.create_backup(&file, None, None).await?.id);
        }

        assert_eq!(manager.cleanup_old_backups(2).await, 2);
        let kept: Vec<&str> = manager.backups_for(&file).iter().map(|b| b.id.as_str()).collect();
        assert_eq!(kept, vec![ids[2].as_str(), ids[3].as_str()]);
        assert_eq!(manager.cleanup_old_backups(2).await, 0);
        assert_eq!(manager.latest_backup(&file).map(|b| b.id.as_str()), Some(ids[3].as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_last_backup_drops_bucket() -> Result<()> {
        let (_dir, mut manager, file) = setup().await;
        let backup = manager.create_backup(&file, None, None).await?;

        assert!(manager.delete_backup(&backup.id).await);
        assert!(!manager.delete_backup(&backup.id).await);
        assert!(manager.backups_for(&file).is_empty());
        assert_eq!(manager.statistics().files_tracked, 0);
        assert!(!backup.backup_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_survives_reopen() -> Result<()> {
        let (dir, mut manager, file) = setup().await;
        let other = dir.path().join("pay.py");
        std::fs::write(&other, "requests.post(SOURCEPAY_URL)")?;
        manager.create_backup(&file, None, None).await?;
        manager.create_backup(&other, None, None).await?;

        let reopened = BackupManager::open(dir.path().join("backups")).await?;
        let stats = reopened.statistics();
        assert_eq!(stats.total_backups, 2);
        assert_eq!(stats.files_tracked, 2);
        assert!(stats.oldest_backup <= stats.newest_backup);
        assert_eq!(reopened.all_backups().len(), 2);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("backups").join(METADATA_FILE))?)?;
        assert_eq!(raw["schemaVersion"], 1);
        assert!(raw["lastUpdated"].is_string());
        assert!(raw["backups"].is_object());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_metadata_means_no_backups() -> Result<()> {
        let dir = TempDir::new()?;
        let backups = dir.path().join("backups");
        std::fs::create_dir_all(&backups)?;
        std::fs::write(backups.join(METADATA_FILE), "{ not json")?;

        let manager = BackupManager::open(&backups).await?;
        assert_eq!(manager.statistics(), BackupStatistics::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_all_backups() -> Result<()> {
        let (_dir, mut manager, file) = setup().await;
        manager.create_backup(&file, None, None).await?;
        manager.create_backup(&file, None, None).await?;

        assert_eq!(manager.delete_all_backups().await, 2);
        assert!(manager.all_backups().is_empty());
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn cleanup_twice_equals_cleanup_once(count in 0usize..6, keep in 0usize..4) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let (_dir, mut manager, file) = setup().await;
                for _ in 0..count {
                    manager.create_backup(&file, None, None).await.unwrap();
                }

                manager.cleanup_old_backups(keep).await;
                let after_first: Vec<String> = manager.all_backups().iter().map(|b| b.id.clone()).collect();
                prop_assert_eq!(manager.cleanup_old_backups(keep).await, 0);
                let after_second: Vec<String> = manager.all_backups().iter().map(|b| b.id.clone()).collect();
                prop_assert_eq!(after_first, after_second);
                prop_assert!(manager.backups_for(&file).len() <= keep);
                Ok(())
            })?;
        }
    }
}
