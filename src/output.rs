//! Output types: per-document reports and their renderings.

use crate::catalog::{Finding, Severity, Warning, WarningCatalog};
use crate::error::{PaperCheckError, Stage};
use crate::model::{Document, SourceKind, Template};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;

/// The result of analysing one paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Display name of the input.
    pub source: String,
    /// Source kind, when the input got far enough to be identified.
    pub kind: Option<SourceKind>,
    pub template: Template,
    /// Ordered, deduplicated warnings.
    pub warnings: Vec<Warning>,
    /// Stage a hard failure stopped the pipeline in; `None` for a full run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<Stage>,
    pub stats: AnalysisStats,
    /// The role-bound document, for downstream rendering.
    #[serde(skip)]
    pub document: Option<Arc<Document>>,
}

/// Counts and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub blocks: usize,
    pub objects: usize,
    pub references: usize,
    pub citations: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Compiling the source into a block tree.
    pub compile_ms: u64,
    /// Normalizing, classifying and binding roles.
    pub structure_ms: u64,
    /// The four checkers, run in parallel.
    pub checks_ms: u64,
    pub total_ms: u64,
}

impl AnalysisStats {
    pub(crate) fn count_severities(&mut self, warnings: &[Warning]) {
        self.high = 0;
        self.medium = 0;
        self.low = 0;
        for w in warnings {
            match w.severity {
                Severity::High => self.high += 1,
                Severity::Medium => self.medium += 1,
                Severity::Low => self.low += 1,
            }
        }
    }
}

impl AnalysisReport {
    /// A report for a document whose pipeline stopped on a hard failure.
    ///
    /// It carries exactly one high-severity warning naming the failure.
    pub fn aborted(
        source: impl Into<String>,
        kind: Option<SourceKind>,
        error: &PaperCheckError,
        catalog: &WarningCatalog,
    ) -> Self {
        let finding = Finding::new(error.warning_code()).with_context(error.to_string());
        let mut warning = catalog.warning(finding, Template::Unknown, kind);
        warning.severity = Severity::High;
        let warnings = vec![warning];
        let mut stats = AnalysisStats::default();
        stats.count_severities(&warnings);
        Self {
            source: source.into(),
            kind,
            template: Template::Unknown,
            warnings,
            aborted_at: Some(error.stage()),
            stats,
            document: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    /// Highest severity among the warnings.
    pub fn max_severity(&self) -> Option<Severity> {
        self.warnings.iter().map(|w| w.severity).max()
    }

    /// Render in the given format.
    pub fn render(&self, format: ReportFormat) -> Result<String, PaperCheckError> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Json => self.to_json(),
            ReportFormat::Csv => self.to_csv(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PaperCheckError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PaperCheckError::Internal(format!("JSON rendering failed: {e}")))
    }

    /// One row per warning: `code,severity,message,help,context,line`.
    pub fn to_csv(&self) -> Result<String, PaperCheckError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let csv_err = |e: csv::Error| PaperCheckError::Internal(format!("CSV rendering failed: {e}"));
        writer
            .write_record(["code", "severity", "message", "help", "context", "line"])
            .map_err(csv_err)?;
        for w in &self.warnings {
            let line = w.line.map(|l| l.to_string()).unwrap_or_default();
            writer
                .write_record([
                    w.code.as_str(),
                    w.severity.as_str(),
                    w.message.as_str(),
                    w.help.as_str(),
                    w.context.as_deref().unwrap_or(""),
                    line.as_str(),
                ])
                .map_err(csv_err)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| PaperCheckError::Internal(format!("CSV rendering failed: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| PaperCheckError::Internal(format!("CSV rendering failed: {e}")))
    }

    /// Human-readable listing used by the command line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let kind = self.kind.map(|k| k.as_str()).unwrap_or("unknown");
        let _ = writeln!(
            out,
            "{} ({}, {}): {} warning{} ({} high, {} medium, {} low)",
            self.source,
            kind,
            self.template,
            self.warnings.len(),
            if self.warnings.len() == 1 { "" } else { "s" },
            self.stats.high,
            self.stats.medium,
            self.stats.low,
        );
        if let Some(stage) = self.aborted_at {
            let _ = writeln!(out, "  aborted during {stage}");
        }
        for w in &self.warnings {
            let _ = write!(out, "  [{}] {}: {}", w.severity, w.code, w.message);
            if let Some(line) = w.line {
                let _ = write!(out, " (line {line})");
            }
            out.push('\n');
            if let Some(context) = &w.context {
                let _ = writeln!(out, "      {context}");
            }
            if !w.help.is_empty() {
                let _ = writeln!(out, "      help: {}", w.help);
            }
        }
        out
    }
}

/// Report rendering formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    /// File extension for reports written in this format.
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = PaperCheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(PaperCheckError::InvalidConfig(format!(
                "Unknown report format '{other}' (expected text, json or csv)"
            ))),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WarningCode;

    fn sample() -> AnalysisReport {
        let catalog = WarningCatalog::builtin();
        let warnings = vec![
            catalog.warning(
                Finding::new(WarningCode::StyleAuthor),
                Template::Edm,
                Some(SourceKind::Docx),
            ),
            catalog.warning(
                Finding::new(WarningCode::StyleLongHeading)
                    .with_context("A, \"quoted\" heading")
                    .at_block(4)
                    .at_line(Some(12)),
                Template::Edm,
                Some(SourceKind::Docx),
            ),
        ];
        let mut stats = AnalysisStats::default();
        stats.count_severities(&warnings);
        AnalysisReport {
            source: "paper.docx".into(),
            kind: Some(SourceKind::Docx),
            template: Template::Edm,
            warnings,
            aborted_at: None,
            stats,
            document: None,
        }
    }

    #[test]
    fn test_csv_has_header_and_escapes() {
        let csv = sample().to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("code,severity,message,help,context,line"));
        assert!(csv.contains("\"A, \"\"quoted\"\" heading\",12"));

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "style_author");
        assert_eq!(&rows[1][4], "A, \"quoted\" heading");
    }

    #[test]
    fn test_json_skips_document_and_round_trips_warnings() {
        let report = sample();
        let json = report.to_json().unwrap();
        assert!(!json.contains("\"document\""));
        assert!(!json.contains("aborted_at"));
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.warnings, report.warnings);
        assert_eq!(back.stats, report.stats);
    }

    #[test]
    fn test_text_listing() {
        let text = sample().to_text();
        assert!(text.starts_with("paper.docx (docx, EDM): 2 warnings"));
        assert!(text.contains("[high] style_author:"));
        assert!(text.contains("(line 12)"));
    }

    #[test]
    fn test_aborted_report_has_one_high_warning() {
        let err = PaperCheckError::Timeout { secs: 5 };
        let report = AnalysisReport::aborted(
            "slow.tex",
            Some(SourceKind::Latex),
            &err,
            WarningCatalog::builtin(),
        );
        assert!(report.is_aborted());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, WarningCode::Timeout);
        assert_eq!(report.max_severity(), Some(Severity::High));
        assert_eq!(report.stats.high, 1);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!(ReportFormat::Csv.extension(), "csv");
        assert!("yaml".parse::<ReportFormat>().is_err());
    }
}
