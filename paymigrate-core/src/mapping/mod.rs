//! Endpoint mapping dictionary and resolver
//!
//! The dictionary is a versioned JSON document mapping every SourcePay
//! endpoint type to its target-API endpoint plus per-field translation
//! rules. A set of common fields (credentials, merchant identity) applies to
//! every endpoint type.

use crate::models::EndpointType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const BUILTIN_DICTIONARY: &str = include_str!("../../data/mappings.json");

/// Translation rule for one source field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Target-API field name
    pub destination: String,
    /// Optional value transformation or validation note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// Mapping of one endpoint type onto the target API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMapping {
    pub source_endpoint: String,
    pub destination_endpoint: String,
    pub method: String,
    #[serde(default)]
    pub description: String,
    /// Keyed by source field, so each source field has one destination
    #[serde(default)]
    pub field_mappings: BTreeMap<String, FieldRule>,
}

/// The whole mapping document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDictionary {
    pub version: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Fields shared by every endpoint type
    #[serde(default)]
    pub common_fields: BTreeMap<String, FieldRule>,
    /// Keyed by [`EndpointType::as_str`]
    pub mappings: BTreeMap<String, EndpointMapping>,
}

impl MappingDictionary {
    /// Parse and validate a dictionary document
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let dictionary: Self = serde_json::from_str(json)
            .map_err(|e| crate::Error::Mapping(format!("Malformed mapping dictionary: {e}")))?;

        for key in dictionary.mappings.keys() {
            key.parse::<EndpointType>()
                .map_err(|_| crate::Error::Mapping(format!("Unknown endpoint type key: {key}")))?;
        }
        Ok(dictionary)
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Dictionary bundled with the crate
    pub fn builtin() -> crate::Result<Self> {
        Self::from_json_str(BUILTIN_DICTIONARY)
    }

    pub fn mapping(&self, endpoint_type: EndpointType) -> Option<&EndpointMapping> {
        self.mappings.get(endpoint_type.as_str())
    }

    /// Destination for a source field, endpoint rules first, then common fields
    pub fn destination_for<'a>(&'a self, mapping: &'a EndpointMapping, source_field: &str) -> Option<&'a FieldRule> {
        mapping
            .field_mappings
            .get(source_field)
            .or_else(|| self.common_fields.get(source_field))
    }
}

/// Outcome of a mapping lookup.
///
/// `Empty` means the endpoint type is supported but needs no field
/// translation; `NotFound` means the endpoint type is unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingLookup<'a> {
    NotFound,
    Empty(&'a EndpointMapping),
    Found(&'a EndpointMapping),
}

impl<'a> MappingLookup<'a> {
    pub fn mapping(&self) -> Option<&'a EndpointMapping> {
        match *self {
            MappingLookup::NotFound => None,
            MappingLookup::Empty(m) | MappingLookup::Found(m) => Some(m),
        }
    }
}

/// A field rule matching a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatchRef {
    /// Endpoint key, or `None` for a common field
    pub endpoint_key: Option<String>,
    pub source_field: String,
    pub destination_field: String,
}

/// Read-only dictionary statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStatistics {
    pub version: String,
    pub total_mappings: usize,
    /// Endpoint field rules plus common fields
    pub total_fields: usize,
    pub last_updated: Option<String>,
}

/// Resolves endpoint types against a loaded dictionary
#[derive(Debug, Clone)]
pub struct MappingResolver {
    dictionary: Arc<MappingDictionary>,
}

impl MappingResolver {
    pub fn new(dictionary: MappingDictionary) -> Self {
        Self {
            dictionary: Arc::new(dictionary),
        }
    }

    /// Resolver over the bundled dictionary
    pub fn builtin() -> crate::Result<Self> {
        Ok(Self::new(MappingDictionary::builtin()?))
    }

    /// Shared handle on the current dictionary
    pub fn dictionary(&self) -> Arc<MappingDictionary> {
        Arc::clone(&self.dictionary)
    }

    pub fn resolve_mapping(&self, endpoint_type: EndpointType) -> MappingLookup<'_> {
        match self.dictionary.mapping(endpoint_type) {
            None => MappingLookup::NotFound,
            Some(mapping) if mapping.field_mappings.is_empty() => MappingLookup::Empty(mapping),
            Some(mapping) => MappingLookup::Found(mapping),
        }
    }

    pub fn get(&self, endpoint_type: EndpointType) -> Option<&EndpointMapping> {
        self.dictionary.mapping(endpoint_type)
    }

    /// Rules whose source or destination name contains `name`, case-insensitively
    pub fn find_mappings_containing_field(&self, name: &str) -> Vec<FieldMatchRef> {
        let needle = name.to_lowercase();
        let matches = |source: &str, rule: &FieldRule| {
            source.to_lowercase().contains(&needle) || rule.destination.to_lowercase().contains(&needle)
        };
        let matches = &matches;

        let mut results: Vec<FieldMatchRef> = self
            .dictionary
            .mappings
            .iter()
            .flat_map(move |(key, mapping)| {
                mapping
                    .field_mappings
                    .iter()
                    .filter(move |(source, rule)| matches(source, rule))
                    .map(move |(source, rule)| FieldMatchRef {
                        endpoint_key: Some(key.clone()),
                        source_field: source.clone(),
                        destination_field: rule.destination.clone(),
                    })
            })
            .collect();

        results.extend(
            self.dictionary
                .common_fields
                .iter()
                .filter(|(source, rule)| matches(source, rule))
                .map(|(source, rule)| FieldMatchRef {
                    endpoint_key: None,
                    source_field: source.clone(),
                    destination_field: rule.destination.clone(),
                }),
        );
        results
    }

    pub fn statistics(&self) -> MappingStatistics {
        let endpoint_fields: usize = self
            .dictionary
            .mappings
            .values()
            .map(|m| m.field_mappings.len())
            .sum();

        MappingStatistics {
            version: self.dictionary.version.clone(),
            total_mappings: self.dictionary.mappings.len(),
            total_fields: endpoint_fields + self.dictionary.common_fields.len(),
            last_updated: self.dictionary.last_updated.clone(),
        }
    }

    /// Swap in a freshly loaded dictionary; the current one stays on failure
    pub fn reload(&mut self, path: &Path) -> crate::Result<()> {
        match MappingDictionary::load(path) {
            Ok(dictionary) => {
                info!(
                    "Reloaded mapping dictionary {} ({} mappings)",
                    dictionary.version,
                    dictionary.mappings.len()
                );
                self.dictionary = Arc::new(dictionary);
                Ok(())
            }
            Err(e) => {
                warn!("Keeping mapping dictionary {}: reload failed: {}", self.dictionary.version, e);
                Err(e)
            }
        }
    }

    /// Human-readable rules handed to the code transformer.
    ///
    /// Endpoint rules come first, then common fields the endpoint does not
    /// override.
    pub fn flatten_rules(&self, mapping: &EndpointMapping) -> Vec<String> {
        let mut rules = vec![format!(
            "endpoint: {} -> {} {}",
            mapping.source_endpoint, mapping.method, mapping.destination_endpoint
        )];

        let common = self
            .dictionary
            .common_fields
            .iter()
            .filter(|(source, _)| !mapping.field_mappings.contains_key(*source));

        for (source, rule) in mapping.field_mappings.iter().chain(common) {
            rules.push(match &rule.transform {
                Some(transform) => format!("{source} -> {} ({transform})", rule.destination),
                None => format!("{source} -> {}", rule.destination),
            });
        }
        rules
    }

    /// Whether a detected field has a rule for this endpoint (common fields included)
    pub fn covers_field(&self, mapping: &EndpointMapping, field: &str) -> bool {
        self.dictionary.destination_for(mapping, field).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver() -> MappingResolver {
        MappingResolver::builtin().unwrap()
    }

    #[test]
    fn test_builtin_covers_every_endpoint_type() {
        let resolver = resolver();
        for endpoint_type in EndpointType::all() {
            assert!(resolver.get(endpoint_type).is_some(), "{endpoint_type} missing");
        }
    }

    #[test]
    fn test_not_found_is_distinct_from_empty() {
        let mut dictionary = MappingDictionary::builtin().unwrap();
        dictionary.mappings.remove("checkout");
        let resolver = MappingResolver::new(dictionary);

        assert_eq!(resolver.resolve_mapping(EndpointType::Checkout), MappingLookup::NotFound);
        assert!(matches!(
            resolver.resolve_mapping(EndpointType::DeviceManagement),
            MappingLookup::Empty(_)
        ));
        assert!(matches!(
            resolver.resolve_mapping(EndpointType::HostedPayments),
            MappingLookup::Found(_)
        ));
        assert!(resolver.resolve_mapping(EndpointType::DeviceManagement).mapping().is_some());
    }

    #[test]
    fn test_find_mappings_containing_field() {
        let resolver = resolver();

        let amount = resolver.find_mappings_containing_field("ssl_amount");
        assert_eq!(amount.len(), 2);
        assert!(amount.iter().all(|m| m.destination_field == "amount.total"));

        let by_destination = resolver.find_mappings_containing_field("APIKEY");
        assert_eq!(by_destination.len(), 1);
        assert_eq!(by_destination[0].endpoint_key, None);
        assert_eq!(by_destination[0].source_field, "ssl_pin");

        assert!(resolver.find_mappings_containing_field("nonexistent").is_empty());
    }

    #[test]
    fn test_statistics() {
        let stats = resolver().statistics();
        assert_eq!(stats.version, "1.2.0");
        assert_eq!(stats.total_mappings, 5);
        assert_eq!(stats.total_fields, 4 + 4 + 1 + 5 + 2);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn test_flatten_rules_includes_common_fields() {
        let resolver = resolver();
        let mapping = resolver.get(EndpointType::HostedPayments).unwrap();
        let rules = resolver.flatten_rules(mapping);

        assert_eq!(rules[0], "endpoint: /hosted-payments/transaction_token -> POST /v1/payment-sessions");
        assert!(rules.contains(&"ssl_amount -> amount.total (decimal string)".to_string()));
        assert!(rules.contains(&"ssl_account_id -> merchantAccountId".to_string()));
        assert_eq!(rules.len(), 1 + 4 + 4);
        assert!(resolver.covers_field(mapping, "ssl_pin"));
        assert!(!resolver.covers_field(mapping, "ssl_card_number"));
    }

    #[test]
    fn test_rejects_unknown_endpoint_keys() {
        let json = r#"{"version":"1","mappings":{"refunds":{"sourceEndpoint":"/r","destinationEndpoint":"/v1/r","method":"POST"}}}"#;
        assert!(matches!(MappingDictionary::from_json_str(json), Err(crate::Error::Mapping(_))));
        assert!(MappingDictionary::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_reload_swaps_and_keeps_on_failure() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mappings.json");
        std::fs::write(
            &path,
            r#"{"version":"2.0.0","mappings":{"checkout":{"sourceEndpoint":"/checkout.js","destinationEndpoint":"/v2/sdk.js","method":"GET"}}}"#,
        )?;

        let mut resolver = resolver();
        let before = resolver.dictionary();
        resolver.reload(&path)?;
        assert_eq!(resolver.statistics().version, "2.0.0");
        assert_eq!(resolver.resolve_mapping(EndpointType::HostedPayments), MappingLookup::NotFound);
        assert_eq!(before.version, "1.2.0");

        std::fs::write(&path, "{broken")?;
        assert!(resolver.reload(&path).is_err());
        assert_eq!(resolver.statistics().version, "2.0.0");
        Ok(())
    }
}
