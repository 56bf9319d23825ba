//! Output formatting for `trailcheck check`

use std::collections::BTreeMap;
use std::sync::Arc;

use eyre::Result;
use facet::Facet;
use owo_colors::OwoColorize;
use trailcheck_core::{Finding, Severity};

use crate::coordinator::{Annotation, AnnotationStatus};

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Everything `check` learned about one message
#[derive(Debug, Clone)]
pub struct Report {
    /// File name, or `<stdin>`
    pub source: String,
    pub findings: Vec<Finding>,
    /// Resolved references by line; empty when running offline
    pub annotations: BTreeMap<usize, Arc<[Annotation]>>,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Finding::is_error)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Render a report in the specified format
pub fn render_report(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => render_json(report),
    }
}

fn render_text(report: &Report) -> String {
    let mut output = String::new();

    for finding in &report.findings {
        let severity = match finding.severity {
            Severity::Error => finding.severity.as_str().red().bold().to_string(),
            Severity::Warning => finding.severity.as_str().yellow().bold().to_string(),
        };
        output.push_str(&format!(
            "{}:{}:{}: {}: {} {}\n",
            report.source,
            finding.line + 1,
            finding.start + 1,
            severity,
            finding.message,
            format!("[{}]", finding.code).dimmed()
        ));
    }

    if !report.annotations.is_empty() {
        if !report.findings.is_empty() {
            output.push('\n');
        }
        output.push_str(&format!("{} References:\n", "->".blue().bold()));
        for (line, annotations) in &report.annotations {
            for annotation in annotations.iter() {
                let marker = match annotation.status {
                    AnnotationStatus::Valid => "ok".green().to_string(),
                    AnnotationStatus::Invalid => "!!".red().to_string(),
                    AnnotationStatus::Unknown => "??".yellow().to_string(),
                };
                output.push_str(&format!(
                    "  {} {}:{} {} {}\n",
                    marker,
                    report.source,
                    line + 1,
                    annotation.label().cyan(),
                    annotation.text
                ));
            }
        }
    }

    let errors = report.count(Severity::Error);
    let warnings = report.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        output.push_str(&format!("{} {} looks good\n", "OK".green().bold(), report.source));
    } else {
        output.push_str(&format!(
            "\n{} error(s), {} warning(s)\n",
            errors.to_string().red(),
            warnings.to_string().yellow()
        ));
    }

    output
}

#[derive(Facet)]
struct JsonReport {
    source: String,
    findings: Vec<Finding>,
    references: Vec<JsonLine>,
}

#[derive(Facet)]
struct JsonLine {
    line: usize,
    annotations: Vec<Annotation>,
}

fn render_json(report: &Report) -> Result<String> {
    let json_report = JsonReport {
        source: report.source.clone(),
        findings: report.findings.clone(),
        references: report
            .annotations
            .iter()
            .map(|(line, annotations)| JsonLine {
                line: *line,
                annotations: annotations.to_vec(),
            })
            .collect(),
    };
    facet_json::to_string_pretty(&json_report)
        .map_err(|e| eyre::eyre!("Failed to serialize report: {e}"))
}
