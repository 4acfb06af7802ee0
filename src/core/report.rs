//! Scan report structures.
//!
//! A connector parses the service reply into a [`Report`]. The variant is
//! fixed by the kind of resource that was scanned, so consumers never
//! have to inspect the connector to know which fields are present.

use crate::core::types::ResourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an antivirus engine flagged the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Infection {
    /// The engine reported a detection.
    Yes,
    /// The engine reported the resource clean.
    No,
    /// The engine gave no usable verdict.
    Unknown,
}

/// The verdict of one antivirus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineVerdict {
    /// Name of the antivirus engine.
    pub antivirus: String,

    /// Engine version, if reported.
    pub version: Option<String>,

    /// When the engine's signatures were last updated.
    pub last_update: Option<DateTime<Utc>>,

    /// Detection name or result text.
    pub result: Option<String>,

    /// The engine's verdict.
    pub infection: Infection,
}

impl EngineVerdict {
    /// Creates a verdict with only the engine name and outcome.
    pub fn new(antivirus: impl Into<String>, infection: Infection) -> Self {
        Self {
            antivirus: antivirus.into(),
            version: None,
            last_update: None,
            result: None,
            infection,
        }
    }

    /// Sets the engine version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the detection name.
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }
}

/// Fields shared by every report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Link to the report on the service's site.
    pub permanent_link: Option<String>,

    /// When the service produced the analysis.
    pub scan_date: Option<DateTime<Utc>>,

    /// Number of engines that flagged the resource.
    pub positives: u32,

    /// Per-engine verdicts.
    #[serde(default)]
    pub results: Vec<EngineVerdict>,
}

impl ReportSummary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the permanent link.
    pub fn with_permanent_link(mut self, link: impl Into<String>) -> Self {
        self.permanent_link = Some(link.into());
        self
    }

    /// Sets the scan date.
    pub fn with_scan_date(mut self, date: DateTime<Utc>) -> Self {
        self.scan_date = Some(date);
        self
    }

    /// Appends an engine verdict and keeps `positives` in step.
    pub fn with_verdict(mut self, verdict: EngineVerdict) -> Self {
        if verdict.infection == Infection::Yes {
            self.positives += 1;
        }
        self.results.push(verdict);
        self
    }
}

/// Report for a scanned file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    /// Shared report fields.
    pub summary: ReportSummary,

    /// SHA-256 of the file, as reported by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// SHA-1 of the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,

    /// MD5 of the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

/// Report for a scanned URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlReport {
    /// Shared report fields.
    pub summary: ReportSummary,

    /// The URL that was analysed.
    pub url: String,

    /// Additional service-specific details.
    #[serde(default)]
    pub details: std::collections::HashMap<String, serde_json::Value>,
}

/// A finished scan report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Report {
    /// Report on an uploaded file.
    File(FileReport),
    /// Report on a submitted URL.
    Url(UrlReport),
}

impl Report {
    /// Returns the resource type this report describes.
    pub fn report_type(&self) -> ResourceType {
        match self {
            Self::File(_) => ResourceType::File,
            Self::Url(_) => ResourceType::Url,
        }
    }

    /// Returns the fields shared by both report kinds.
    pub fn summary(&self) -> &ReportSummary {
        match self {
            Self::File(report) => &report.summary,
            Self::Url(report) => &report.summary,
        }
    }

    /// Returns the number of engines that flagged the resource.
    pub fn positives(&self) -> u32 {
        self.summary().positives
    }

    /// Returns `true` if at least one engine flagged the resource.
    pub fn is_infected(&self) -> bool {
        self.positives() > 0
    }

    /// Returns the link to the report on the service's site.
    pub fn permanent_link(&self) -> Option<&str> {
        self.summary().permanent_link.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_matches_variant() {
        let file = Report::File(FileReport::default());
        let url = Report::Url(UrlReport {
            url: "http://example.com".into(),
            ..UrlReport::default()
        });
        assert_eq!(file.report_type(), ResourceType::File);
        assert_eq!(url.report_type(), ResourceType::Url);
    }

    #[test]
    fn test_positives_follow_verdicts() {
        let summary = ReportSummary::new()
            .with_verdict(EngineVerdict::new("engine-a", Infection::Yes).with_result("Trojan.X"))
            .with_verdict(EngineVerdict::new("engine-b", Infection::No))
            .with_verdict(EngineVerdict::new("engine-c", Infection::Unknown));

        let report = Report::File(FileReport {
            summary,
            ..FileReport::default()
        });
        assert_eq!(report.positives(), 1);
        assert!(report.is_infected());
        assert_eq!(report.summary().results.len(), 3);
    }

    #[test]
    fn test_clean_report() {
        let report = Report::Url(UrlReport {
            summary: ReportSummary::new().with_permanent_link("https://service/report/1"),
            url: "http://example.com".into(),
            ..UrlReport::default()
        });
        assert!(!report.is_infected());
        assert_eq!(report.permanent_link(), Some("https://service/report/1"));
    }

    #[test]
    fn test_report_serializes_with_type_tag() {
        let report = Report::File(FileReport::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["type"], "file");
    }
}
