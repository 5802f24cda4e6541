//! Run output: records, issues, per-page summaries, stats, and export.

use crate::error::PageError;
use crate::pipeline::page::PageOutcome;
use crate::record::{Field, Issue, NormalizedRecord, RawRecord};
use serde::{Deserialize, Serialize};

/// Column order of the tabular export.
pub const CSV_COLUMNS: [Field; 10] = [
    Field::Id,
    Field::VoterId,
    Field::Name,
    Field::FatherOrHusbandName,
    Field::Gender,
    Field::Age,
    Field::HouseNumber,
    Field::AcPartInfo,
    Field::WardPartNo,
    Field::WardPartName,
];

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollOutput {
    /// Normalised, de-duplicated records in page order.
    pub records: Vec<NormalizedRecord>,
    /// Field diagnostics for every recognised record, including ones the
    /// final de-duplication later dropped.
    pub issues: Vec<Issue>,
    /// The approximate live preview, for display only.
    pub preview: Vec<RawRecord>,
    pub pages: Vec<PageSummary>,
    /// `None` when the caller supplied its own renderer.
    pub metadata: Option<DocumentMetadata>,
    pub stats: RunStats,
}

/// What one page contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Raw records kept for this page.
    pub records: usize,
    /// Render resolution of the kept attempt.
    pub dpi: Option<u32>,
    pub used_fallback: bool,
    pub error: Option<PageError>,
    pub duration_ms: u64,
}

impl From<&PageOutcome> for PageSummary {
    fn from(o: &PageOutcome) -> Self {
        Self {
            page_num: o.page_num,
            records: o.records.len(),
            dpi: o.dpi,
            used_fallback: o.used_fallback,
            error: o.error.clone(),
            duration_ms: o.duration_ms,
        }
    }
}

impl PageSummary {
    /// False only for pages cancelled before they kept any records.
    pub fn is_processed(&self) -> bool {
        self.records > 0 || !self.error.as_ref().is_some_and(PageError::is_cancelled)
    }
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages the selection asked for.
    pub selected_pages: usize,
    /// Pages that ran to completion, failed or not, plus pages cancelled
    /// during their fallback render that kept their primary records.
    pub processed_pages: usize,
    /// Pages that contributed nothing because recognition or rendering failed.
    pub failed_pages: usize,
    /// Pages re-rendered at the fallback resolution.
    pub fallback_pages: usize,
    pub raw_records: usize,
    pub preview_records: usize,
    pub final_records: usize,
    pub issue_count: usize,
    pub cancelled: bool,
    pub total_duration_ms: u64,
}

/// PDF document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

impl RollOutput {
    /// CSV with a header row and the fixed column order in [`CSV_COLUMNS`].
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<&str> = CSV_COLUMNS.iter().map(|f| f.as_str()).collect();
        out.push_str(&header.join(","));
        out.push_str("\r\n");
        for record in &self.records {
            let row: Vec<String> = CSV_COLUMNS
                .iter()
                .map(|f| csv_field(record.get(*f)))
                .collect();
            out.push_str(&row.join(","));
            out.push_str("\r\n");
        }
        out
    }

    /// Pretty-printed JSON of the whole output.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// RFC 4180 quoting: quote when the value holds a comma, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
