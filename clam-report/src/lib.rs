//! HTML clinical report and plain-text download rendering.

pub mod styles;

use chrono::{DateTime, Utc};
use clam_core::DiagnosticResult;
use serde::{Deserialize, Serialize};

use crate::styles::StatusPalette;

/// Outcome shown in the status box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportStatus {
    Assessed { result: DiagnosticResult },
    /// Prediction disabled because the classifier artifact could not be loaded.
    ModelMissing,
    /// The model loaded but returned an unusable probability.
    ClassifierFailed { reason: String },
}

impl ReportStatus {
    pub fn status_text(&self) -> &str {
        match self {
            ReportStatus::Assessed { result } => &result.status,
            ReportStatus::ModelMissing => "SYSTEM ERROR: MODEL MISSING",
            ReportStatus::ClassifierFailed { .. } => "SYSTEM ERROR: CLASSIFIER FAILURE",
        }
    }

    pub fn risk_percent(&self) -> String {
        match self {
            ReportStatus::Assessed { result } => result.risk_percent(),
            ReportStatus::ModelMissing | ReportStatus::ClassifierFailed { .. } => "0.0".to_string(),
        }
    }

    pub fn palette(&self) -> StatusPalette {
        match self {
            ReportStatus::Assessed { result } if result.label.is_elevated() => styles::ELEVATED,
            ReportStatus::Assessed { .. } => styles::CLEAR,
            ReportStatus::ModelMissing | ReportStatus::ClassifierFailed { .. } => styles::MODEL_MISSING,
        }
    }
}

/// Body of the report: generated narrative or the reason it is missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum NarrativeSection {
    Text(String),
    Unavailable(String),
}

/// Everything needed to render one report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicalReport {
    pub patient_name: String,
    pub age: u32,
    pub status: ReportStatus,
    pub narrative: NarrativeSection,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub model_accuracy: Option<f64>,
}

impl ClinicalReport {
    pub fn new(
        patient_name: impl Into<String>,
        age: u32,
        status: ReportStatus,
        narrative: NarrativeSection,
    ) -> Self {
        Self {
            patient_name: patient_name.into(),
            age,
            status,
            narrative,
            generated_at: Utc::now(),
            model_accuracy: None,
        }
    }

    pub fn with_model_accuracy(mut self, accuracy: Option<f64>) -> Self {
        self.model_accuracy = accuracy;
        self
    }

    /// Unix timestamp of generation, used as report id.
    pub fn report_id(&self) -> i64 {
        self.generated_at.timestamp()
    }

    pub fn report_date(&self) -> String {
        self.generated_at.format("%d %B %Y").to_string()
    }
}

/// Banner line for the landing view, e.g. `Diagnostic Accuracy: 88.0%`.
pub fn accuracy_banner(accuracy: Option<f64>) -> Option<String> {
    accuracy.map(|value| format!("Diagnostic Accuracy: {:.1}%", value * 100.0))
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn narrative_html(section: &NarrativeSection) -> String {
    match section {
        NarrativeSection::Text(text) => format!(
            "<div style=\"{}\">\n{}\n</div>",
            styles::NARRATIVE,
            escape_html(text).replace('\n', "<br>")
        ),
        NarrativeSection::Unavailable(reason) => format!(
            "<div style=\"{}\"><strong>NARRATIVE UNAVAILABLE:</strong> {}</div>",
            styles::NARRATIVE_ERROR,
            escape_html(reason)
        ),
    }
}

fn disclaimer_basis(accuracy: Option<f64>) -> String {
    match accuracy {
        Some(value) => format!("a model with {:.0}% reported accuracy", value * 100.0),
        None => "a statistical model".to_string(),
    }
}

/// Render the full printable report document.
pub fn render_html(report: &ClinicalReport) -> String {
    let palette = report.status.palette();
    let patient = escape_html(&report.patient_name);
    let status = escape_html(&report.status.status_text().to_uppercase());
    let risk = report.status.risk_percent();
    let sans = styles::SANS;

    format!(
        r#"<html>
<body style="margin:0; padding:0; background-color: {paper};">
  <div style="{page}">
    <table width="100%" style="border-bottom: 2px solid {accent}; margin-bottom: 20px;">
      <tr>
        <td style="padding-bottom: 10px;">
          <h1 style="margin:0; color: {accent}; {sans}">CLINICAL ANALYSIS REPORT</h1>
          <p style="margin:0; font-size: 0.85em; color: {muted}; {sans}">Generated by Cardiovascular Learning Analysis Model (C.L.A.M.)</p>
        </td>
        <td style="text-align: right; vertical-align: bottom; {sans} font-size: 0.8em; color: {muted};">
          REPORT ID: {report_id}
        </td>
      </tr>
    </table>

    <div style="background-color: {bg}; color: {fg}; border: 1px solid {border}; padding: 15px; text-align: center; margin-bottom: 30px;">
      <h2 style="margin:0; {sans} font-size: 1.2em;">DIAGNOSTIC STATUS: {status}</h2>
      <p style="margin: 5px 0 0 0; {sans}">Statistical Confidence Score: {risk}%</p>
    </div>

    <table width="100%" style="{patient_table}">
      <tr>
        <td><strong>PATIENT NAME:</strong> {patient}</td>
        <td style="text-align: right;"><strong>DATE:</strong> {date}</td>
      </tr>
      <tr>
        <td><strong>AGE:</strong> {age}</td>
        <td style="text-align: right;"><strong>REFERRAL:</strong> Automated AI System</td>
      </tr>
    </table>

    {narrative}

    <div style="{disclaimer}">
      <strong>OFFICIAL DISCLAIMER:</strong> This document is an automated synthesis of data patterns based on {basis}. It does not constitute a legal medical diagnosis.
      Final clinical decisions should be made in consultation with a licensed medical professional.
    </div>

    <p style="{signature}">
      Digital Signature: C.L.A.M. Physician Core
    </p>
  </div>
</body>
</html>
"#,
        paper = styles::PAPER,
        page = styles::PAGE,
        accent = styles::ACCENT,
        muted = styles::MUTED,
        report_id = report.report_id(),
        bg = palette.background,
        fg = palette.text,
        border = palette.border,
        patient_table = styles::PATIENT_TABLE,
        date = report.report_date(),
        age = report.age,
        narrative = narrative_html(&report.narrative),
        disclaimer = styles::DISCLAIMER,
        basis = disclaimer_basis(report.model_accuracy),
        signature = styles::SIGNATURE,
    )
}

/// Plain-text variant offered as a download.
pub fn render_text(report: &ClinicalReport) -> String {
    let body = match &report.narrative {
        NarrativeSection::Text(text) => text.clone(),
        NarrativeSection::Unavailable(reason) => format!("Narrative unavailable: {reason}"),
    };
    format!(
        "CLINICAL REPORT\nPatient: {}\n\n{body}",
        report.patient_name
    )
}

/// `Report_<name>.txt`, with characters unsafe in file names replaced by `_`.
pub fn download_file_name(patient_name: &str) -> String {
    let safe: String = patient_name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("Report_{safe}.txt")
}
