//! Configuration loading
//!
//! Configuration files may be TOML, JSON or YAML; the format is picked from
//! the file extension. [`PipelineConfig`] is the typed view the migration
//! pipeline consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Configuration loader that supports TOML, JSON and YAML
#[derive(Debug, Default)]
pub struct ConfigLoader {
    configs: HashMap<String, serde_json::Value>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file, registering it under its file stem
    pub fn load_file(&mut self, path: &Path) -> crate::Result<()> {
        let content = std::fs::read_to_string(path)?;
        let config_value = parse_value(&content, &extension_of(path))?;

        let config_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("default")
            .to_string();

        self.configs.insert(config_name, config_value);
        Ok(())
    }

    /// Get configuration value by dot-separated key path
    pub fn get_value(&self, config_name: &str, key_path: &str) -> Option<&serde_json::Value> {
        let config = self.configs.get(config_name)?;
        get_nested_value(config, key_path)
    }

    pub fn get_string(&self, config_name: &str, key_path: &str) -> Option<String> {
        self.get_value(config_name, key_path)?.as_str().map(ToString::to_string)
    }

    pub fn get_int(&self, config_name: &str, key_path: &str) -> Option<i64> {
        self.get_value(config_name, key_path)?.as_i64()
    }

    pub fn get_bool(&self, config_name: &str, key_path: &str) -> Option<bool> {
        self.get_value(config_name, key_path)?.as_bool()
    }

    /// Merge a value into a named configuration (the new value wins)
    pub fn merge_config(&mut self, name: &str, other_config: serde_json::Value) {
        if let Some(existing) = self.configs.get_mut(name) {
            merge_json_values(existing, other_config);
        } else {
            self.configs.insert(name.to_string(), other_config);
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn parse_value(content: &str, extension: &str) -> crate::Result<serde_json::Value> {
    match extension {
        "toml" => {
            let toml_value: toml::Value = toml::from_str(content)
                .map_err(|e| crate::UtilError::Config(format!("TOML parse error: {e}")))?;
            serde_json::to_value(toml_value)
                .map_err(|e| crate::UtilError::Config(format!("TOML conversion error: {e}")))
        }
        "json" => serde_json::from_str(content)
            .map_err(|e| crate::UtilError::Config(format!("JSON parse error: {e}"))),
        "yml" | "yaml" => serde_yaml::from_str(content)
            .map_err(|e| crate::UtilError::Config(format!("YAML parse error: {e}"))),
        other => Err(crate::UtilError::Config(format!("Unsupported config format: {other}"))),
    }
}

fn get_nested_value<'a>(value: &'a serde_json::Value, key_path: &str) -> Option<&'a serde_json::Value> {
    key_path.split('.').try_fold(value, |current, key| current.get(key))
}

/// Merge two JSON values (second overrides first)
fn merge_json_values(base: &mut serde_json::Value, override_value: serde_json::Value) {
    match (base, override_value) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(override_obj)) => {
            for (key, value) in override_obj {
                match base_obj.get_mut(&key) {
                    Some(existing) => merge_json_values(existing, value),
                    None => {
                        base_obj.insert(key, value);
                    }
                }
            }
        }
        (base_value, override_value) => {
            *base_value = override_value;
        }
    }
}

/// Load a typed configuration from file
pub fn load_config<T>(path: &Path) -> crate::Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = std::fs::read_to_string(path)?;
    let value = parse_value(&content, &extension_of(path))?;
    serde_json::from_value(value)
        .map_err(|e| crate::UtilError::Config(format!("Invalid configuration in {}: {e}", path.display())))
}

/// Merge two configurations (second overrides first)
pub fn merge_configs<T>(base: &mut T, override_value: serde_json::Value) -> crate::Result<()>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let mut base_value = serde_json::to_value(&*base)
        .map_err(|e| crate::UtilError::Serialization(format!("Base serialization error: {e}")))?;

    merge_json_values(&mut base_value, override_value);

    *base = serde_json::from_value(base_value)
        .map_err(|e| crate::UtilError::Serialization(format!("Result deserialization error: {e}")))?;

    Ok(())
}

/// Typed configuration for the detection and migration pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding backup copies and their metadata document
    pub backup_directory: PathBuf,
    /// JSON document holding the migration history
    pub history_file: PathBuf,
    /// Maximum number of history entries kept
    pub max_history_entries: usize,
    /// Backups kept per file by the retention sweep
    pub max_backups_per_file: usize,
    /// Optional mapping dictionary overriding the bundled one
    pub mapping_dictionary: Option<PathBuf>,
    /// Fail a migration when the file changed at all since detection
    pub strict_drift_check: bool,
    /// Successful results revalidated live after a bulk run
    pub bulk_sample_size: usize,
    /// Lines of context sent above a snippet
    pub context_lines_before: usize,
    /// Lines of context sent below a snippet
    pub context_lines_after: usize,
    pub log_level: crate::logging::LogLevel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backup_directory: PathBuf::from(".paymigrate/backups"),
            history_file: PathBuf::from(".paymigrate/history.json"),
            max_history_entries: 100,
            max_backups_per_file: 10,
            mapping_dictionary: None,
            strict_drift_check: false,
            bulk_sample_size: 3,
            context_lines_before: 5,
            context_lines_after: 4,
            log_level: crate::logging::LogLevel::Info,
        }
    }
}

impl PipelineConfig {
    /// Load the pipeline configuration; a missing file yields the defaults
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        load_config(path)
    }

    /// Resolve relative paths against a workspace root
    pub fn rooted_at(mut self, root: &Path) -> Self {
        if self.backup_directory.is_relative() {
            self.backup_directory = root.join(&self.backup_directory);
        }
        if self.history_file.is_relative() {
            self.history_file = root.join(&self.history_file);
        }
        if let Some(dictionary) = self.mapping_dictionary.take() {
            self.mapping_dictionary = Some(if dictionary.is_relative() {
                root.join(dictionary)
            } else {
                dictionary
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_loader() -> crate::Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("gateway.json");

        std::fs::write(
            &config_path,
            r#"{ "sourcepay": { "endpoint": "https://api.sourcepay.com", "retries": 3, "sandbox": true } }"#,
        )?;

        let mut loader = ConfigLoader::new();
        loader.load_file(&config_path)?;

        assert_eq!(
            loader.get_string("gateway", "sourcepay.endpoint"),
            Some("https://api.sourcepay.com".to_string())
        );
        assert_eq!(loader.get_int("gateway", "sourcepay.retries"), Some(3));
        assert_eq!(loader.get_bool("gateway", "sourcepay.sandbox"), Some(true));
        assert_eq!(loader.get_value("gateway", "sourcepay.missing"), None);

        Ok(())
    }

    #[test]
    fn test_pipeline_config_from_toml() -> crate::Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("paymigrate.toml");
        std::fs::write(
            &config_path,
            "max_history_entries = 50\nstrict_drift_check = true\nlog_level = \"debug\"\n",
        )?;

        let config = PipelineConfig::load(&config_path)?;
        assert_eq!(config.max_history_entries, 50);
        assert!(config.strict_drift_check);
        assert_eq!(config.log_level, crate::logging::LogLevel::Debug);
        // Unset keys keep their defaults
        assert_eq!(config.bulk_sample_size, 3);
        assert_eq!(config.context_lines_before, 5);

        Ok(())
    }

    #[test]
    fn test_pipeline_config_missing_file_uses_defaults() -> crate::Result<()> {
        let temp_dir = tempdir()?;
        let config = PipelineConfig::load(&temp_dir.path().join("absent.yaml"))?;
        assert_eq!(config, PipelineConfig::default());
        Ok(())
    }

    #[test]
    fn test_unsupported_format() -> crate::Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("paymigrate.ini");
        std::fs::write(&config_path, "[core]\n")?;
        assert!(matches!(
            load_config::<PipelineConfig>(&config_path),
            Err(crate::UtilError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn test_merge_configs() -> crate::Result<()> {
        let mut base = PipelineConfig::default();
        merge_configs(&mut base, serde_json::json!({ "max_backups_per_file": 2 }))?;
        assert_eq!(base.max_backups_per_file, 2);
        assert_eq!(base.max_history_entries, 100);
        Ok(())
    }

    #[test]
    fn test_rooted_paths() {
        let config = PipelineConfig::default().rooted_at(Path::new("/work/shop"));
        assert_eq!(config.backup_directory, PathBuf::from("/work/shop/.paymigrate/backups"));
        assert_eq!(config.history_file, PathBuf::from("/work/shop/.paymigrate/history.json"));
    }
}
