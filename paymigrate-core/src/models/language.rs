//! Source languages the detector understands

use serde::{Deserialize, Serialize};

/// Language of a unit of source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Php,
    Java,
    CSharp,
    Ruby,
    Go,
    /// Anything else; generic heuristics only
    Unknown,
}

impl Language {
    /// All concrete languages
    pub fn all() -> [Language; 8] {
        [
            Language::JavaScript,
            Language::TypeScript,
            Language::Python,
            Language::Php,
            Language::Java,
            Language::CSharp,
            Language::Ruby,
            Language::Go,
        ]
    }

    /// Tag used in requests, history records and file-extension lookup
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Php => "php",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Go => "go",
            Language::Unknown => "unknown",
        }
    }

    /// Parse a language tag; unknown tags map to [`Language::Unknown`]
    pub fn from_tag(tag: &str) -> Language {
        match tag.trim().to_lowercase().as_str() {
            "javascript" | "js" | "javascriptreact" | "node" => Language::JavaScript,
            "typescript" | "ts" | "typescriptreact" => Language::TypeScript,
            "python" | "py" => Language::Python,
            "php" => Language::Php,
            "java" => Language::Java,
            "csharp" | "c#" | "cs" => Language::CSharp,
            "ruby" | "rb" => Language::Ruby,
            "go" | "golang" => Language::Go,
            _ => Language::Unknown,
        }
    }

    /// Detect the language of a file from its extension
    pub fn from_path(path: &std::path::Path) -> Language {
        paymigrate_utils::detect_language(path).map_or(Language::Unknown, Language::from_tag)
    }

    /// Languages whose statements are delimited by braces and semicolons
    pub fn is_brace_language(&self) -> bool {
        matches!(
            self,
            Language::JavaScript
                | Language::TypeScript
                | Language::Java
                | Language::CSharp
                | Language::Php
        )
    }

    /// Whether a missing statement terminator is an error rather than a style issue
    pub fn requires_semicolons(&self) -> bool {
        matches!(self, Language::Java | Language::CSharp | Language::Php)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
