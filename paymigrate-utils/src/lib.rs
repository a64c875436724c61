//! paymigrate utilities
//!
//! Shared plumbing for the detection and migration crates: logging
//! bootstrap, layered configuration, file helpers and string helpers.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod config;
pub mod file;
pub mod logging;
pub mod string;

pub use config::{load_config, merge_configs, ConfigLoader, PipelineConfig};
pub use file::{decode_text_lossy, normalize_path, read_text_lossy, write_atomic};
pub use logging::{basic_config, init_logging, LogLevel, LoggerConfig};
pub use string::{camel_to_snake, expand_to_lines, line_of_offset, safe_truncate};

/// Result type used throughout the utility crate
pub type Result<T> = std::result::Result<T, UtilError>;

/// Error types for utility operations
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path operation error
    #[error("Path operation error: {0}")]
    PathOperation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Directory names and globs skipped when scanning a source tree
pub fn default_exclusion_patterns() -> std::collections::HashSet<String> {
    [
        ".git",
        ".svn",
        ".hg",
        "node_modules",
        "vendor",
        "target",
        "dist",
        "build",
        "__pycache__",
        ".venv",
        "venv",
        "*.min.js",
        "*.map",
        ".paymigrate",
    ]
    .iter()
    .map(|p| (*p).to_string())
    .collect()
}

/// File extensions per language tag
const LANGUAGE_EXTENSIONS: &[(&str, &[&str])] = &[
    ("javascript", &["js", "jsx", "mjs", "cjs"]),
    ("typescript", &["ts", "tsx"]),
    ("python", &["py"]),
    ("php", &["php", "phtml"]),
    ("java", &["java"]),
    ("csharp", &["cs"]),
    ("ruby", &["rb"]),
    ("go", &["go"]),
];

/// Language tags and the file extensions that select them
pub fn supported_language_extensions() -> &'static [(&'static str, &'static [&'static str])] {
    LANGUAGE_EXTENSIONS
}

/// Detect a language tag from a file extension
pub fn detect_language(file_path: &std::path::Path) -> Option<&'static str> {
    let extension = file_path.extension()?.to_str()?.to_lowercase();

    supported_language_extensions()
        .iter()
        .find(|(_, exts)| exts.contains(&extension.as_str()))
        .map(|(language, _)| *language)
}

/// Check if a path should be excluded based on patterns
pub fn should_exclude_path(path: &std::path::Path, patterns: &std::collections::HashSet<String>) -> bool {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    for pattern in patterns {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if file_name.ends_with(&suffix.to_lowercase()) {
                return true;
            }
        } else if path
            .components()
            .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(pattern))
        {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language(&PathBuf::from("pay.py")), Some("python"));
        assert_eq!(detect_language(&PathBuf::from("checkout.JS")), Some("javascript"));
        assert_eq!(detect_language(&PathBuf::from("Gateway.cs")), Some("csharp"));
        assert_eq!(detect_language(&PathBuf::from("notes.txt")), None);
        assert_eq!(detect_language(&PathBuf::from("Makefile")), None);
    }

    #[test]
    fn test_exclusion_patterns() {
        let patterns = default_exclusion_patterns();

        assert!(should_exclude_path(&PathBuf::from("web/node_modules/lib/index.js"), &patterns));
        assert!(should_exclude_path(&PathBuf::from("public/app.min.js"), &patterns));
        assert!(should_exclude_path(&PathBuf::from(".git/config"), &patterns));
        assert!(!should_exclude_path(&PathBuf::from("src/payments/checkout.js"), &patterns));
        // Component matching, not substring matching
        assert!(!should_exclude_path(&PathBuf::from("src/rebuild/pay.php"), &patterns));
    }
}
