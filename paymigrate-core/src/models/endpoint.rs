//! Endpoint types and detected endpoints

use super::Language;
use serde::{Deserialize, Serialize};

/// Closed set of source-API usage categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    /// Hosted payment page token creation
    HostedPayments,
    /// Checkout script embedding
    Checkout,
    /// Direct transaction processing
    ProcessTransaction,
    /// Batch upload and settlement
    BatchProcessing,
    /// Terminal and device management
    DeviceManagement,
}

impl EndpointType {
    /// All endpoint types, in detection tie-break order
    pub fn all() -> [EndpointType; 5] {
        [
            EndpointType::HostedPayments,
            EndpointType::Checkout,
            EndpointType::ProcessTransaction,
            EndpointType::BatchProcessing,
            EndpointType::DeviceManagement,
        ]
    }

    /// Key used in the mapping dictionary and persisted records
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::HostedPayments => "hosted_payments",
            EndpointType::Checkout => "checkout",
            EndpointType::ProcessTransaction => "process_transaction",
            EndpointType::BatchProcessing => "batch_processing",
            EndpointType::DeviceManagement => "device_management",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EndpointType::HostedPayments => "Hosted Payments",
            EndpointType::Checkout => "Checkout",
            EndpointType::ProcessTransaction => "Process Transaction",
            EndpointType::BatchProcessing => "Batch Processing",
            EndpointType::DeviceManagement => "Device Management",
        }
    }
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndpointType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "hosted_payments" | "hostedpayments" => Ok(EndpointType::HostedPayments),
            "checkout" => Ok(EndpointType::Checkout),
            "process_transaction" | "processtransaction" => Ok(EndpointType::ProcessTransaction),
            "batch_processing" | "batchprocessing" => Ok(EndpointType::BatchProcessing),
            "device_management" | "devicemanagement" => Ok(EndpointType::DeviceManagement),
            _ => Err(crate::Error::UnknownEndpointType(s.to_string())),
        }
    }
}

/// One usage of the source API found in a file.
///
/// Produced by the detector and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEndpoint {
    pub id: String,
    pub file_path: String,
    /// 1-based line of the first line of `code`
    pub line_number: usize,
    pub endpoint_type: EndpointType,
    /// Exact text of the whole lines covering the usage
    pub code: String,
    /// Source-API field names, ordered and unique
    pub ssl_fields: Vec<String>,
    pub language: Language,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Hash of the whole scanned text at detection time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl DetectedEndpoint {
    /// Build an endpoint with a fresh id, de-duplicating `ssl_fields` in order
    pub fn new(
        file_path: impl Into<String>,
        line_number: usize,
        endpoint_type: EndpointType,
        code: impl Into<String>,
        ssl_fields: Vec<String>,
        language: Language,
        confidence: f64,
    ) -> Self {
        let mut unique = Vec::with_capacity(ssl_fields.len());
        for field in ssl_fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.into(),
            line_number,
            endpoint_type,
            code: code.into(),
            ssl_fields: unique,
            language,
            confidence: confidence.clamp(0.0, 1.0),
            content_hash: None,
        }
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}
