use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::statement::StatementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Duplicate state, derived from fingerprints — recomputable at any time.
/// Duplicates are flagged, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "similarity")]
pub enum DuplicateFlag {
    None,
    /// Identical fingerprint to an earlier transaction in the same statement.
    Exact,
    /// Same amount, nearby date, similar description — needs human confirmation.
    Possible(f32),
}

impl DuplicateFlag {
    pub fn is_duplicate(self) -> bool {
        !matches!(self, DuplicateFlag::None)
    }
}

/// A canonical transaction owned by exactly one statement. Immutable once
/// created except through corrections, each of which is recorded in the
/// append-only audit trail rather than overwriting history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<TransactionId>,
    pub statement_id: StatementId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    /// Running balance as reported by the source, when present.
    pub balance: Option<Money>,
    /// SHA-256 hex fingerprint used for duplicate detection.
    pub fingerprint: String,
    pub category: Option<String>,
    pub category_confidence: f32,
    pub duplicate: DuplicateFlag,
    /// Set when extraction confidence fell below the review threshold or the
    /// date was ambiguous; the row is kept, never silently dropped.
    pub needs_review: bool,
    /// Extraction confidence for this row (1.0 for structured formats).
    pub row_confidence: f32,
}

impl Transaction {
    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionField {
    Description,
    Category,
    Amount,
}

impl fmt::Display for CorrectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CorrectionField::Description => "description",
            CorrectionField::Category => "category",
            CorrectionField::Amount => "amount",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CorrectionField {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "description" => Ok(CorrectionField::Description),
            "category" => Ok(CorrectionField::Category),
            "amount" => Ok(CorrectionField::Amount),
            other => Err(format!("Unknown correction field: '{other}'")),
        }
    }
}

/// Append-only audit record for a manual correction. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub id: Option<i64>,
    pub transaction_id: TransactionId,
    pub field: CorrectionField,
    pub previous_value: String,
    pub new_value: String,
    pub reason: String,
    pub actor: String,
    pub corrected_at: DateTime<Utc>,
}
