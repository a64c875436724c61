//! Offline transformer driven purely by the mapping dictionary
//!
//! Renames mapped fields on word boundaries, swaps the SourcePay host for the
//! target host and rewrites the endpoint path. Useful as a dry-run backend
//! and as a fallback when no generative transformer is configured.

use super::CodeTransformer;
use crate::types::{TransformationRequest, TransformationResponse};
use crate::{Result, TransformError};
use async_trait::async_trait;
use paymigrate_core::MappingDictionary;
use regex::{Captures, Regex};
use std::sync::Arc;
use tracing::debug;

lazy_static::lazy_static! {
    static ref SOURCE_HOST: Regex =
        Regex::new(r"(?i)\b(?:[a-z0-9-]+\.)*sourcepay\.com\b").expect("source host pattern must compile");
}

const DEFAULT_TARGET_HOST: &str = "api.relaypay.io";
/// Self-reported confidence of a mechanical rewrite
const RULE_BASED_CONFIDENCE: f64 = 0.6;

pub struct RuleBasedTransformer {
    dictionary: Arc<MappingDictionary>,
    target_host: String,
}

impl RuleBasedTransformer {
    pub fn new(dictionary: Arc<MappingDictionary>) -> Self {
        Self {
            dictionary,
            target_host: DEFAULT_TARGET_HOST.to_string(),
        }
    }

    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = host.into();
        self
    }

    /// Apply every applicable rule; `None` when nothing changed
    pub fn rewrite(&self, request: &TransformationRequest) -> Result<Option<String>> {
        let Some(mapping) = self.dictionary.mapping(request.endpoint_type) else {
            return Ok(None);
        };

        let mut code = SOURCE_HOST
            .replace_all(&request.code, self.target_host.as_str())
            .into_owned();
        if !mapping.source_endpoint.is_empty() {
            // Whole path only: `/batch` must not rewrite `/batches`
            let source = &mapping.source_endpoint;
            let path = Regex::new(&format!(r#"{}(?P<end>['"`\s?#),;]|$)"#, regex::escape(source)))
                .map_err(|e| TransformError::Generation(format!("bad endpoint rule {source}: {e}")))?;
            code = path
                .replace_all(&code, |caps: &Captures| {
                    format!("{}{}", mapping.destination_endpoint, &caps["end"])
                })
                .into_owned();
        }

        let rules = mapping.field_mappings.iter().chain(
            self.dictionary
                .common_fields
                .iter()
                .filter(|(source, _)| !mapping.field_mappings.contains_key(*source)),
        );
        for (source, rule) in rules {
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(source)))
                .map_err(|e| TransformError::Generation(format!("bad field rule {source}: {e}")))?;
            code = pattern.replace_all(&code, rule.destination.as_str()).into_owned();
        }

        Ok((code != request.code).then_some(code))
    }
}

#[async_trait]
impl CodeTransformer for RuleBasedTransformer {
    async fn transform(&self, request: &TransformationRequest) -> Result<TransformationResponse> {
        match self.rewrite(request)? {
            Some(code) => Ok(TransformationResponse::success(code, Some(RULE_BASED_CONFIDENCE))),
            None => {
                debug!("No rule applied to {} snippet", request.endpoint_type);
                Ok(TransformationResponse::failure("no mapping rule applies to this snippet"))
            }
        }
    }

    fn name(&self) -> &str {
        "rule-based"
    }
}
