use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::money::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementId(pub Uuid);

impl StatementId {
    pub fn new() -> Self {
        StatementId(Uuid::new_v4())
    }
}

impl Default for StatementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for StatementId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StatementId(Uuid::parse_str(s)?))
    }
}

/// Declared or detected source file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Ofx,
    Qif,
    PdfTable,
    Image,
    Unknown,
}

impl SourceFormat {
    /// Structured formats parse deterministically; the rest go through
    /// text extraction with per-row confidence.
    pub fn is_structured(self) -> bool {
        matches!(self, SourceFormat::Csv | SourceFormat::Ofx | SourceFormat::Qif)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Ofx => "ofx",
            SourceFormat::Qif => "qif",
            SourceFormat::PdfTable => "pdf_table",
            SourceFormat::Image => "image",
            SourceFormat::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(SourceFormat::Csv),
            "ofx" => Ok(SourceFormat::Ofx),
            "qif" => Ok(SourceFormat::Qif),
            "pdf_table" => Ok(SourceFormat::PdfTable),
            "image" => Ok(SourceFormat::Image),
            "unknown" => Ok(SourceFormat::Unknown),
            other => Err(format!("Unknown source format: '{other}'")),
        }
    }
}

/// Per-statement pipeline state. One writer at a time: each stage owns the
/// statement exclusively for the duration of its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Uploaded,
    DetectingFormat,
    Extracting,
    Normalizing,
    Deduplicating,
    Categorizing,
    ReadyForReconciliation,
    Reconciled,
    NeedsReview,
    Failed,
}

impl StatementStatus {
    /// Legal transitions. `Failed` is reachable from every processing stage;
    /// a failed statement may only be resubmitted manually (back to
    /// `Uploaded`), never auto-retried.
    pub fn can_advance_to(self, next: StatementStatus) -> bool {
        use StatementStatus::*;
        match (self, next) {
            (Uploaded, DetectingFormat)
            | (DetectingFormat, Extracting)
            | (Extracting, Normalizing)
            | (Normalizing, Deduplicating)
            | (Deduplicating, Categorizing)
            | (Categorizing, ReadyForReconciliation)
            | (Categorizing, NeedsReview)
            | (ReadyForReconciliation, Reconciled)
            | (ReadyForReconciliation, NeedsReview)
            | (NeedsReview, ReadyForReconciliation)
            | (Failed, Uploaded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatementStatus::Reconciled | StatementStatus::NeedsReview | StatementStatus::Failed
        )
    }
}

impl StatementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementStatus::Uploaded => "uploaded",
            StatementStatus::DetectingFormat => "detecting_format",
            StatementStatus::Extracting => "extracting",
            StatementStatus::Normalizing => "normalizing",
            StatementStatus::Deduplicating => "deduplicating",
            StatementStatus::Categorizing => "categorizing",
            StatementStatus::ReadyForReconciliation => "ready_for_reconciliation",
            StatementStatus::Reconciled => "reconciled",
            StatementStatus::NeedsReview => "needs_review",
            StatementStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StatementStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(StatementStatus::Uploaded),
            "detecting_format" => Ok(StatementStatus::DetectingFormat),
            "extracting" => Ok(StatementStatus::Extracting),
            "normalizing" => Ok(StatementStatus::Normalizing),
            "deduplicating" => Ok(StatementStatus::Deduplicating),
            "categorizing" => Ok(StatementStatus::Categorizing),
            "ready_for_reconciliation" => Ok(StatementStatus::ReadyForReconciliation),
            "reconciled" => Ok(StatementStatus::Reconciled),
            "needs_review" => Ok(StatementStatus::NeedsReview),
            "failed" => Ok(StatementStatus::Failed),
            other => Err(format!("Unknown statement status: '{other}'")),
        }
    }
}

/// Account details declared at upload time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub account_id: String,
    pub account_name: Option<String>,
    pub bank_id: Option<String>,
    pub currency: Currency,
}

/// One uploaded bank/card file and its processing state.
/// Statements are never deleted — only archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: StatementId,
    pub account: AccountMeta,
    pub format: SourceFormat,
    pub filename: String,
    /// SHA-256 hex digest of the uploaded bytes (content-addressed store key).
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: StatementStatus,
    /// Cause retained verbatim when `status == Failed`.
    pub failure: Option<String>,
    pub archived: bool,
}

impl Statement {
    pub fn new(
        account: AccountMeta,
        filename: impl Into<String>,
        content_hash: impl Into<String>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Statement {
            id: StatementId::new(),
            account,
            format: SourceFormat::Unknown,
            filename: filename.into(),
            content_hash: content_hash.into(),
            uploaded_at,
            status: StatementStatus::Uploaded,
            failure: None,
            archived: false,
        }
    }
}
