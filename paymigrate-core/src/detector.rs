//! SourcePay usage detector
//!
//! Runs the pattern library over a unit of text and reports endpoint
//! categories, SSL field names, nearby HTTP-client calls, configuration
//! references and migration-intent comments. Detection is pure: malformed
//! input yields empty lists, never an error.

use crate::hash::content_hash;
use crate::models::{
    CommentMatch, ConfigRefKind, ConfigReference, DetectedEndpoint, DetectionReport, EndpointMatch,
    FieldMatch, HttpCallMatch, Language,
};
use crate::pattern::{PatternLibrary, PROXIMITY_WINDOW};
use paymigrate_utils::{camel_to_snake, expand_to_lines, line_of_offset, should_exclude_path};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

const BASE_CONFIDENCE: f64 = 0.5;
const MATCH_COUNT_STEP: f64 = 0.1;
const MATCH_COUNT_CAP: f64 = 0.3;
const SSL_FIELD_BONUS: f64 = 0.2;
const SOURCE_DOMAIN_BONUS: f64 = 0.2;
const HTTP_IDIOM_BONUS: f64 = 0.1;

/// Detector bound to a pattern library
#[derive(Debug, Clone, Copy)]
pub struct Detector<'a> {
    library: &'a PatternLibrary,
}

impl Default for Detector<'static> {
    fn default() -> Self {
        Self::new(PatternLibrary::shared())
    }
}

impl<'a> Detector<'a> {
    pub fn new(library: &'a PatternLibrary) -> Self {
        Self { library }
    }

    /// Run every detection family over `text`
    pub fn detect(&self, text: &str, language: Language) -> DetectionReport {
        let fields = self.detect_fields(text);
        let endpoints = self.detect_endpoints(text, language, &fields);

        DetectionReport {
            endpoints,
            http_calls: self.detect_http_calls(text, language),
            config_refs: self.detect_config_refs(text),
            comments: self.detect_comments(text),
            fields,
        }
    }

    /// Build one [`DetectedEndpoint`] per matched category.
    ///
    /// The snippet is the whole lines covering the category's first match,
    /// so it is always an exact substring of `text`.
    pub fn scan_source(&self, file_path: &str, text: &str, language: Language) -> Vec<DetectedEndpoint> {
        let report = self.detect(text, language);
        if report.endpoints.is_empty() {
            return Vec::new();
        }

        let hash = content_hash(text);
        report
            .endpoints
            .iter()
            .map(|m| {
                let (start, end) = expand_to_lines(text, m.start, m.end);
                DetectedEndpoint::new(
                    file_path,
                    line_of_offset(text, start),
                    m.endpoint_type,
                    &text[start..end],
                    m.ssl_fields.clone(),
                    language,
                    m.confidence,
                )
                .with_content_hash(hash.clone())
            })
            .collect()
    }

    /// Scan every supported source file under `root`
    pub fn scan_directory(&self, root: &Path, exclusions: &HashSet<String>) -> crate::Result<Vec<DetectedEndpoint>> {
        if !root.is_dir() {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {}", root.display()),
            )));
        }

        info!("Scanning {} for SourcePay usage", root.display());
        let mut endpoints = Vec::new();
        let mut files_scanned = 0usize;

        let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !should_exclude_path(relative, exclusions)
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let language = Language::from_path(path);
            if language == Language::Unknown {
                continue;
            }

            let text = match paymigrate_utils::read_text_lossy(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Could not read {}: {}", path.display(), e);
                    continue;
                }
            };

            files_scanned += 1;
            let found = self.scan_source(&path.to_string_lossy(), &text, language);
            if !found.is_empty() {
                debug!("{} endpoint(s) in {}", found.len(), path.display());
            }
            endpoints.extend(found);
        }

        info!(
            "Scan completed: {} endpoints in {} files",
            endpoints.len(),
            files_scanned
        );
        Ok(endpoints)
    }

    fn detect_endpoints(&self, text: &str, language: Language, fields: &[FieldMatch]) -> Vec<EndpointMatch> {
        let has_ssl_fields = !fields.is_empty();
        let has_source_domain = self.library.source_domain().is_match(text);
        let has_http_idiom = self
            .library
            .http_idioms(language)
            .iter()
            .any(|idiom| idiom.compiled_regex.is_match(text));
        let ssl_fields: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();

        let mut endpoints: Vec<EndpointMatch> = self
            .library
            .endpoint_rules()
            .iter()
            .filter_map(|rule| {
                let mut match_count = 0usize;
                let mut first: Option<(usize, usize)> = None;
                for pattern in &rule.patterns {
                    for m in pattern.compiled_regex.find_iter(text) {
                        match_count += 1;
                        if first.map_or(true, |(start, _)| m.start() < start) {
                            first = Some((m.start(), m.end()));
                        }
                    }
                }
                let (start, end) = first?;

                let mut confidence = BASE_CONFIDENCE + (MATCH_COUNT_STEP * match_count as f64).min(MATCH_COUNT_CAP);
                if has_ssl_fields {
                    confidence += SSL_FIELD_BONUS;
                }
                if has_source_domain {
                    confidence += SOURCE_DOMAIN_BONUS;
                }
                if has_http_idiom {
                    confidence += HTTP_IDIOM_BONUS;
                }

                Some(EndpointMatch {
                    endpoint_type: rule.endpoint_type,
                    match_count,
                    line_number: line_of_offset(text, start),
                    start,
                    end,
                    confidence: confidence.min(1.0),
                    ssl_fields: ssl_fields.clone(),
                })
            })
            .collect();

        endpoints.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.endpoint_type.cmp(&b.endpoint_type))
        });
        endpoints
    }

    fn detect_fields(&self, text: &str) -> Vec<FieldMatch> {
        let mut found: Vec<FieldMatch> = Vec::new();

        for (index, line) in text.lines().enumerate() {
            for m in self.library.field_core().find_iter(line) {
                let Some(name) = normalize_field_name(m.as_str()) else {
                    continue;
                };
                if self.library.is_tls_setting(&name) || found.iter().any(|f| f.name == name) {
                    continue;
                }
                found.push(FieldMatch {
                    name,
                    raw: m.as_str().to_string(),
                    line_number: index + 1,
                    confidence: 1.0,
                });
            }
        }

        for variation in self.library.field_variations() {
            for (index, line) in text.lines().enumerate() {
                for captures in variation.rule.compiled_regex.captures_iter(line) {
                    let Some(raw) = captures.get(1) else {
                        continue;
                    };
                    let Some(name) = normalize_field_name(raw.as_str()) else {
                        continue;
                    };
                    if self.library.is_tls_setting(&name) {
                        continue;
                    }
                    // Lenient matches never shadow a name already found
                    if found
                        .iter()
                        .any(|f| f.name == name || f.name.contains(&name) || name.contains(&f.name))
                    {
                        continue;
                    }
                    found.push(FieldMatch {
                        name,
                        raw: raw.as_str().to_string(),
                        line_number: index + 1,
                        confidence: variation.confidence(),
                    });
                }
            }
        }

        found
    }

    fn detect_http_calls(&self, text: &str, language: Language) -> Vec<HttpCallMatch> {
        let markers: Vec<(usize, usize)> = self
            .library
            .source_marker()
            .find_iter(text)
            .filter(|m| !self.library.is_tls_setting(m.as_str()))
            .map(|m| (m.start(), m.end()))
            .collect();
        if markers.is_empty() {
            return Vec::new();
        }

        let mut calls = Vec::new();
        for idiom in self.library.http_idioms(language) {
            for m in idiom.compiled_regex.find_iter(text) {
                let window_start = m.start().saturating_sub(PROXIMITY_WINDOW);
                let window_end = m.end() + PROXIMITY_WINDOW;
                let nearby: Vec<&(usize, usize)> = markers
                    .iter()
                    .filter(|(start, end)| *end >= window_start && *start <= window_end)
                    .collect();
                if nearby.is_empty() {
                    continue;
                }

                let (line_start, line_end) = expand_to_lines(text, m.start(), m.end());
                let same_line = nearby
                    .iter()
                    .any(|(start, end)| *start >= line_start && *end <= line_end);

                calls.push(HttpCallMatch {
                    idiom: idiom.name.clone(),
                    language,
                    line_number: line_of_offset(text, m.start()),
                    code: text[line_start..line_end].trim().to_string(),
                    confidence: if same_line { 0.9 } else { 0.7 },
                });
            }
        }

        calls.sort_by_key(|c| c.line_number);
        calls
    }

    fn detect_config_refs(&self, text: &str) -> Vec<ConfigReference> {
        let mut refs: Vec<ConfigReference> = Vec::new();

        for config_rule in self.library.config_rules() {
            for captures in config_rule.rule.compiled_regex.captures_iter(text) {
                let Some(key) = captures.get(1) else {
                    continue;
                };
                if config_rule.kind == ConfigRefKind::ConfigKey && is_domain_name(key.as_str()) {
                    continue;
                }
                if self.library.is_tls_setting(key.as_str()) {
                    continue;
                }

                let line_number = line_of_offset(text, key.start());
                if refs.iter().any(|r| r.key == key.as_str() && r.line_number == line_number) {
                    continue;
                }
                refs.push(ConfigReference {
                    key: key.as_str().to_string(),
                    kind: config_rule.kind,
                    line_number,
                });
            }
        }

        refs.sort_by_key(|r| r.line_number);
        refs
    }

    fn detect_comments(&self, text: &str) -> Vec<CommentMatch> {
        self.library
            .comment_line()
            .captures_iter(text)
            .filter_map(|captures| {
                let body = captures.get(1)?;
                let has_intent = self
                    .library
                    .comment_intent()
                    .find_iter(body.as_str())
                    .any(|m| !self.library.is_tls_setting(m.as_str()));
                if !has_intent {
                    return None;
                }
                Some(CommentMatch {
                    text: body.as_str().trim().to_string(),
                    line_number: line_of_offset(text, body.start()),
                })
            })
            .collect()
    }
}

/// Normalize a captured field spelling to `ssl_snake_case`
fn normalize_field_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '$' | ':' | '[' | ']'));
    let trimmed = trimmed.strip_prefix("data-").unwrap_or(trimmed);

    let snake = camel_to_snake(&trimmed.replace('-', "_")).to_lowercase();
    let mut name = String::with_capacity(snake.len());
    for ch in snake.chars() {
        if ch == '_' && name.ends_with('_') {
            continue;
        }
        name.push(ch);
    }
    let name = name.trim_end_matches('_').to_string();

    (name.starts_with("ssl_") && name.len() > 4).then_some(name)
}

/// `sourcepay.com` and friends are URLs, not configuration keys
fn is_domain_name(key: &str) -> bool {
    key.split('.')
        .nth(1)
        .is_some_and(|segment| matches!(segment.to_lowercase().as_str(), "com" | "net" | "org" | "io"))
}
