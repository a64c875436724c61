//! History export and results analysis
//!
//! Every format is derived purely from in-memory entries and results.

use crate::types::{MigrationHistoryEntry, MigrationResult};
use crate::validation::ComplexityTier;
use crate::{Result, TransformError};
use paymigrate_core::EndpointType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

const CSV_HEADER: &str = "id,timestamp,file_path,line_number,endpoint_type,success,error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Full fidelity
    Json,
    /// Human summary
    Markdown,
    /// One row per migration
    Csv,
}

impl FromStr for ExportFormat {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            other => Err(TransformError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Render history entries in the requested format
pub fn export_history(entries: &[MigrationHistoryEntry], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        ExportFormat::Markdown => Ok(history_markdown(entries)),
        ExportFormat::Csv => Ok(history_csv(entries)),
    }
}

fn history_markdown(entries: &[MigrationHistoryEntry]) -> String {
    let successful = entries.iter().filter(|e| e.success).count();
    let mut report = String::new();

    report.push_str("# Migration History\n\n");
    report.push_str(&format!("**Total Migrations:** {}\n", entries.len()));
    report.push_str(&format!("**Successful:** {successful}\n"));
    report.push_str(&format!("**Failed:** {}\n\n", entries.len() - successful));

    for entry in entries {
        let status = if entry.success { "success" } else { "failed" };
        report.push_str(&format!(
            "## {}:{} ({})\n",
            entry.file_path,
            entry.line_number,
            entry.endpoint_type.display_name()
        ));
        report.push_str(&format!("- **Id:** {}\n", entry.id));
        report.push_str(&format!("- **When:** {}\n", entry.timestamp.to_rfc3339()));
        report.push_str(&format!("- **Status:** {status}\n"));
        if let Some(error) = &entry.error {
            report.push_str(&format!("- **Error:** {error}\n"));
        }
        report.push('\n');
    }
    report
}

fn history_csv(entries: &[MigrationHistoryEntry]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for entry in entries {
        let row = [
            csv_field(&entry.id),
            csv_field(&entry.timestamp.to_rfc3339()),
            csv_field(&entry.file_path),
            entry.line_number.to_string(),
            entry.endpoint_type.as_str().to_string(),
            entry.success.to_string(),
            csv_field(entry.error.as_deref().unwrap_or("")),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

/// Quote a CSV field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTypeBreakdown {
    pub total: usize,
    pub successful: usize,
}

/// Structured report over a set of migration results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsAnalysis {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// In [0, 1]; 0 for an empty set
    pub success_rate: f64,
    /// Mean field-coverage confidence of successful results
    pub average_confidence: f64,
    pub review_required: usize,
    pub by_endpoint_type: BTreeMap<EndpointType, EndpointTypeBreakdown>,
    /// Keyed by complexity tier name
    pub complexity_distribution: BTreeMap<String, usize>,
    /// Error messages seen more than once, most frequent first
    pub recurring_errors: Vec<(String, usize)>,
}

pub fn analyze_results(results: &[MigrationResult]) -> ResultsAnalysis {
    let mut analysis = ResultsAnalysis {
        total: results.len(),
        ..ResultsAnalysis::default()
    };
    let mut error_counts: HashMap<&str, usize> = HashMap::new();
    let mut confidence_sum = 0.0;

    for result in results {
        let breakdown = analysis
            .by_endpoint_type
            .entry(result.metadata.endpoint_type)
            .or_default();
        breakdown.total += 1;

        if result.success {
            analysis.successful += 1;
            breakdown.successful += 1;
            confidence_sum += result.metadata.confidence;
        } else if let Some(error) = &result.error {
            *error_counts.entry(error.as_str()).or_insert(0) += 1;
        }

        if result.review_required() {
            analysis.review_required += 1;
        }
        if let Some(validation) = &result.validation {
            *analysis
                .complexity_distribution
                .entry(validation.complexity.as_str().to_string())
                .or_insert(0) += 1;
        }
    }

    analysis.failed = analysis.total - analysis.successful;
    if analysis.total > 0 {
        analysis.success_rate = analysis.successful as f64 / analysis.total as f64;
    }
    if analysis.successful > 0 {
        analysis.average_confidence = confidence_sum / analysis.successful as f64;
    }

    let mut recurring: Vec<(String, usize)> = error_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(error, count)| (error.to_string(), count))
        .collect();
    recurring.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    analysis.recurring_errors = recurring;

    analysis
}

impl ResultsAnalysis {
    pub fn to_markdown(&self) -> String {
        let mut report = String::new();

        report.push_str("# Migration Results Analysis\n\n");
        report.push_str(&format!("**Total:** {}\n", self.total));
        report.push_str(&format!("**Successful:** {}\n", self.successful));
        report.push_str(&format!("**Failed:** {}\n", self.failed));
        report.push_str(&format!("**Success Rate:** {:.1}%\n", self.success_rate * 100.0));
        report.push_str(&format!("**Average Confidence:** {:.2}\n", self.average_confidence));
        report.push_str(&format!("**Review Required:** {}\n\n", self.review_required));

        if !self.by_endpoint_type.is_empty() {
            report.push_str("## By Endpoint Type\n\n");
            report.push_str("| Endpoint type | Total | Successful |\n|---|---|---|\n");
            for (endpoint_type, breakdown) in &self.by_endpoint_type {
                report.push_str(&format!(
                    "| {} | {} | {} |\n",
                    endpoint_type.display_name(),
                    breakdown.total,
                    breakdown.successful
                ));
            }
            report.push('\n');
        }

        if !self.complexity_distribution.is_empty() {
            report.push_str("## Complexity\n\n");
            for tier in [ComplexityTier::Low, ComplexityTier::Medium, ComplexityTier::High] {
                let count = self.complexity_distribution.get(tier.as_str()).copied().unwrap_or(0);
                report.push_str(&format!("- {}: {count}\n", tier.as_str()));
            }
            report.push('\n');
        }

        if !self.recurring_errors.is_empty() {
            report.push_str("## Recurring Errors\n\n");
            for (error, count) in &self.recurring_errors {
                report.push_str(&format!("- {error} ({count}x)\n"));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineDiff, MigrationMetadata};
    use chrono::Utc;

    fn entry(id: &str, success: bool, error: Option<&str>) -> MigrationHistoryEntry {
        MigrationHistoryEntry {
            id: id.to_string(),
            timestamp: Utc::now(),
            file_path: "src/checkout, legacy.js".to_string(),
            line_number: 12,
            endpoint_type: EndpointType::HostedPayments,
            original_code: String::new(),
            migrated_code: String::new(),
            success,
            error: error.map(str::to_string),
            rollback: None,
        }
    }

    fn result(endpoint_type: EndpointType, success: bool, confidence: f64, error: Option<&str>) -> MigrationResult {
        MigrationResult {
            success,
            original_code: String::new(),
            migrated_code: String::new(),
            diff: LineDiff::default(),
            validation: None,
            metadata: MigrationMetadata {
                migration_id: "m".to_string(),
                endpoint_type,
                confidence,
                elapsed_ms: 1,
                file_path: "pay.js".to_string(),
                line_number: 1,
                backup_id: None,
            },
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!("xml".parse::<ExportFormat>(), Err(TransformError::UnsupportedFormat(f)) if f == "xml"));
    }

    #[test]
    fn test_csv_quotes_fields() -> Result<()> {
        let csv = export_history(&[entry("a", false, Some("said \"no\""))], ExportFormat::Csv)?;
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("a,"));
        assert!(lines[1].contains("\"src/checkout, legacy.js\",12,hosted_payments,false,"));
        assert!(lines[1].ends_with("\"said \"\"no\"\"\""));
        Ok(())
    }

    #[test]
    fn test_markdown_and_json_exports() -> Result<()> {
        let entries = [entry("a", true, None), entry("b", false, Some("timeout"))];

        let markdown = export_history(&entries, ExportFormat::Markdown)?;
        assert!(markdown.starts_with("# Migration History"));
        assert!(markdown.contains("**Successful:** 1"));
        assert!(markdown.contains("- **Error:** timeout"));

        let json = export_history(&entries, ExportFormat::Json)?;
        let parsed: Vec<MigrationHistoryEntry> = serde_json::from_str(&json)?;
        assert_eq!(parsed, entries);
        Ok(())
    }

    #[test]
    fn test_analyze_results() {
        let results = [
            result(EndpointType::Checkout, true, 0.9, None),
            result(EndpointType::Checkout, true, 0.7, None),
            result(EndpointType::BatchProcessing, false, 0.0, Some("could not locate original code: pay.js")),
            result(EndpointType::BatchProcessing, false, 0.0, Some("could not locate original code: pay.js")),
            result(EndpointType::DeviceManagement, false, 0.0, Some("code generation failed: empty")),
        ];
        let analysis = analyze_results(&results);

        assert_eq!(analysis.total, 5);
        assert_eq!(analysis.successful, 2);
        assert_eq!(analysis.failed, 3);
        assert!((analysis.success_rate - 0.4).abs() < 1e-9);
        assert!((analysis.average_confidence - 0.8).abs() < 1e-9);
        assert_eq!(analysis.by_endpoint_type[&EndpointType::Checkout].successful, 2);
        assert_eq!(analysis.by_endpoint_type[&EndpointType::BatchProcessing].total, 2);
        assert_eq!(
            analysis.recurring_errors,
            vec![("could not locate original code: pay.js".to_string(), 2)]
        );

        let markdown = analysis.to_markdown();
        assert!(markdown.contains("**Success Rate:** 40.0%"));
        assert!(markdown.contains("| Checkout | 2 | 2 |"));
        assert!(markdown.contains("## Recurring Errors"));
    }

    #[test]
    fn test_analyze_empty() {
        let analysis = analyze_results(&[]);
        assert_eq!(analysis, ResultsAnalysis::default());
        assert!(analysis.to_markdown().contains("**Total:** 0"));
    }
}
