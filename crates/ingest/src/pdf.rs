use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use statera_core::IngestError;

use crate::record::{RawRecord, RowSource};

/// Abstraction over PDF text extraction. Implementations take raw PDF bytes
/// and return layout-preserving text.
pub trait PdfTextEngine: Send + Sync {
    fn extract_text(&self, data: &[u8]) -> Result<String, IngestError>;
}

impl PdfTextEngine for std::sync::Arc<dyn PdfTextEngine> {
    fn extract_text(&self, data: &[u8]) -> Result<String, IngestError> {
        (**self).extract_text(data)
    }
}

/// Returns a pre-set string — lets the table detector be tested without
/// poppler installed.
pub struct MockPdfEngine {
    pub text: String,
}

impl MockPdfEngine {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl PdfTextEngine for MockPdfEngine {
    fn extract_text(&self, _data: &[u8]) -> Result<String, IngestError> {
        Ok(self.text.clone())
    }
}

/// Shells out to `pdftotext -layout` (poppler-utils). Column alignment in
/// the output is what the table detector keys on.
pub struct PdftotextEngine;

impl PdfTextEngine for PdftotextEngine {
    fn extract_text(&self, data: &[u8]) -> Result<String, IngestError> {
        let mut child = Command::new("pdftotext")
            .args(["-layout", "-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IngestError::ExternalToolFailure {
                tool: "pdftotext".to_string(),
                detail: format!("failed to spawn (poppler-utils installed?): {e}"),
            })?;

        child
            .stdin
            .take()
            .expect("stdin piped")
            .write_all(data)
            .map_err(|e| IngestError::ExternalToolFailure {
                tool: "pdftotext".to_string(),
                detail: e.to_string(),
            })?;

        let output = child.wait_with_output().map_err(|e| IngestError::ExternalToolFailure {
            tool: "pdftotext".to_string(),
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(IngestError::ExternalToolFailure {
                tool: "pdftotext".to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if text.trim().is_empty() {
            // Scanned/image-only PDFs produce no text layer; the caller
            // should route those through the OCR extractor instead.
            return Err(IngestError::ExternalToolFailure {
                tool: "pdftotext".to_string(),
                detail: "no text layer (scanned PDF?)".to_string(),
            });
        }
        Ok(text)
    }
}

/// Table extractor over the engine's text output. Emits canonical cells
/// `[date, description, amount, balance]` per detected row.
pub struct PdfTableExtractor<E: PdfTextEngine> {
    engine: E,
}

impl<E: PdfTextEngine> PdfTableExtractor<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: PdfTextEngine> RowSource for PdfTableExtractor<E> {
    fn rows<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Box<dyn Iterator<Item = Result<RawRecord, IngestError>> + 'a> {
        let text = match self.engine.extract_text(data) {
            Ok(t) => t,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        Box::new(detect_table_rows(&text).into_iter().map(Ok))
    }
}

/// Text extraction is never certain about column boundaries, even for a
/// clean layout.
pub const ROW_SHAPE_CONFIDENCE: f32 = 0.9;

/// Scan layout text for transaction-shaped lines: two or more columns
/// (runs of 2+ spaces) with a date cell and at least one amount cell.
pub fn detect_table_rows(text: &str) -> Vec<RawRecord> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let cells: Vec<&str> = split_columns(line);
        if cells.len() < 2 {
            continue;
        }

        let amount_idxs: Vec<usize> = cells
            .iter()
            .enumerate()
            .filter(|(_, c)| re_amount().is_match(c))
            .map(|(i, _)| i)
            .collect();
        if amount_idxs.is_empty() {
            continue; // header, address or footer text
        }

        // Amount lines without a date are summary furniture (totals, fee
        // recaps), not transactions.
        let Some(date_idx) = cells.iter().position(|c| re_date().is_match(c)) else {
            continue;
        };

        // Last amount column is the running balance when two are present.
        let (amount_idx, balance_idx) = match amount_idxs.as_slice() {
            [single] => (*single, None),
            [.., second_last, last] => (*second_last, Some(*last)),
            [] => unreachable!(),
        };

        let description = cells
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx && *i != amount_idx && Some(*i) != balance_idx)
            .map(|(_, c)| *c)
            .collect::<Vec<_>>()
            .join(" ");

        rows.push(RawRecord::with_confidence(
            vec![
                cells[date_idx].to_string(),
                description,
                cells[amount_idx].to_string(),
                balance_idx.map(|i| cells[i].to_string()).unwrap_or_default(),
            ],
            line_no,
            ROW_SHAPE_CONFIDENCE,
        ));
    }
    rows
}

fn split_columns(line: &str) -> Vec<&str> {
    line.split("  ")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

fn re_amount() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r"^\(?-?[\$€£]?\s?[\d,]+\.\d{2}\)?(\s?(CR|DR))?$").expect("invalid regex")
    })
}

fn re_date() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{1,2} [A-Za-z]{3} \d{2,4})$")
            .expect("invalid regex")
    })
}
