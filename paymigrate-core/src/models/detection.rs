//! Findings produced by one detector pass

use super::{EndpointType, Language};
use serde::{Deserialize, Serialize};

/// Everything the detector found in one unit of text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Sorted by descending confidence
    pub endpoints: Vec<EndpointMatch>,
    pub fields: Vec<FieldMatch>,
    pub http_calls: Vec<HttpCallMatch>,
    pub config_refs: Vec<ConfigReference>,
    pub comments: Vec<CommentMatch>,
}

impl DetectionReport {
    /// True when no source-API usage of any kind was found
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
            && self.fields.is_empty()
            && self.http_calls.is_empty()
            && self.config_refs.is_empty()
            && self.comments.is_empty()
    }

    /// Field names in discovery order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// One endpoint category matched in the text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMatch {
    pub endpoint_type: EndpointType,
    /// Total matches across the category's patterns
    pub match_count: usize,
    /// 1-based line of the first match
    pub line_number: usize,
    /// Byte range of the first match
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    /// SSL-style field names present anywhere in the text
    pub ssl_fields: Vec<String>,
}

/// A source-API field name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Normalized name, e.g. `ssl_account_id`
    pub name: String,
    /// Text as written in the source
    pub raw: String,
    pub line_number: usize,
    pub confidence: f64,
}

/// An HTTP-client call near a source-API marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCallMatch {
    /// Name of the idiom, e.g. `fetch` or `requests.post`
    pub idiom: String,
    pub language: Language,
    pub line_number: usize,
    pub code: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigRefKind {
    EnvironmentVariable,
    ConfigKey,
    Secret,
}

/// A configuration or secret reference tied to the source API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigReference {
    pub key: String,
    pub kind: ConfigRefKind,
    pub line_number: usize,
}

/// A comment expressing migration intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentMatch {
    pub text: String,
    pub line_number: usize,
}
