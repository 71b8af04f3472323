use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statera_core::{Currency, IngestError, Money};
use std::str::FromStr;

use crate::record::RawRecord;

/// Column-role assignment for a row source. Either `amount_column` or the
/// debit/credit pair must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date_column: usize,
    pub description_column: usize,
    #[serde(default)]
    pub amount_column: Option<usize>,
    #[serde(default)]
    pub debit_column: Option<usize>,
    #[serde(default)]
    pub credit_column: Option<usize>,
    #[serde(default)]
    pub balance_column: Option<usize>,
    /// Column holding a debit/credit marker that decides the sign.
    #[serde(default)]
    pub type_column: Option<usize>,
}

impl ColumnMapping {
    /// Cell order emitted by the OFX/QIF extractors.
    pub fn canonical_block() -> Self {
        ColumnMapping {
            date_column: 0,
            description_column: 1,
            amount_column: Some(2),
            debit_column: None,
            credit_column: None,
            balance_column: None,
            type_column: None,
        }
    }

    /// Cell order emitted by the PDF-table and OCR extractors.
    pub fn canonical_table() -> Self {
        ColumnMapping {
            balance_column: Some(3),
            ..Self::canonical_block()
        }
    }
}

/// Ordered fallback list used when a bank profile does not pin the format.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m/%d/%y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%m-%d-%y",
    "%d-%m-%y",
    "%d %b %Y",
    "%b %d, %Y",
];

/// A normalized row, not yet fingerprinted or persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub balance: Option<Money>,
    /// Set when the date string was ambiguous for the configured formats.
    pub ambiguous_date: bool,
    pub row_confidence: f32,
    pub source_line: u32,
}

pub struct Normalizer {
    mapping: ColumnMapping,
    date_formats: Vec<String>,
    currency: Currency,
    /// Some banks export charges with the opposite sign convention.
    negate_amounts: bool,
}

impl Normalizer {
    pub fn new(mapping: ColumnMapping, currency: Currency) -> Self {
        Normalizer {
            mapping,
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
            currency,
            negate_amounts: false,
        }
    }

    pub fn with_date_formats(mut self, formats: Vec<String>) -> Self {
        if !formats.is_empty() {
            self.date_formats = formats;
        }
        self
    }

    pub fn with_negated_amounts(mut self, negate: bool) -> Self {
        self.negate_amounts = negate;
        self
    }

    pub fn normalize(&self, record: &RawRecord) -> Result<DraftTransaction, IngestError> {
        let date_cell = self.required_cell(record, self.mapping.date_column, "date")?;
        let (date, ambiguous_date) = parse_date(date_cell, &self.date_formats)?;

        let description = record
            .cell(self.mapping.description_column)
            .unwrap_or_default()
            .to_string();

        let mut minor = self.amount_minor_units(record)?;
        if let Some(col) = self.mapping.type_column {
            if let Some(marker) = record.cell(col) {
                minor = apply_type_marker(minor, marker);
            }
        }
        if self.negate_amounts {
            minor = -minor;
        }

        let balance = match self.mapping.balance_column.and_then(|c| record.cell(c)) {
            Some(cell) if !cell.is_empty() => {
                let cents = parse_amount(cell).map_err(|detail| IngestError::Normalization {
                    field: "balance".to_string(),
                    detail,
                })?;
                Some(Money::new(cents, self.currency))
            }
            _ => None,
        };

        Ok(DraftTransaction {
            date,
            description,
            amount: Money::new(minor, self.currency),
            balance,
            ambiguous_date,
            row_confidence: record.confidence,
            source_line: record.line,
        })
    }

    fn amount_minor_units(&self, record: &RawRecord) -> Result<i64, IngestError> {
        if let Some(col) = self.mapping.amount_column {
            let cell = self.required_cell(record, col, "amount")?;
            return parse_amount(cell).map_err(|detail| IngestError::Normalization {
                field: "amount".to_string(),
                detail,
            });
        }

        let (debit_col, credit_col) = match (self.mapping.debit_column, self.mapping.credit_column)
        {
            (Some(d), Some(c)) => (d, c),
            _ => {
                return Err(IngestError::Normalization {
                    field: "amount".to_string(),
                    detail: "mapping defines neither amount nor debit/credit columns".to_string(),
                })
            }
        };

        let debit = non_empty(record.cell(debit_col));
        let credit = non_empty(record.cell(credit_col));
        // Debits are outflows (negative); credits are inflows.
        match (debit, credit) {
            (Some(d), None) => parse_amount(d)
                .map(|cents| -cents.abs())
                .map_err(|detail| IngestError::Normalization { field: "debit".into(), detail }),
            (None, Some(c)) => parse_amount(c)
                .map(|cents| cents.abs())
                .map_err(|detail| IngestError::Normalization { field: "credit".into(), detail }),
            (None, None) => Err(IngestError::Normalization {
                field: "amount".to_string(),
                detail: "both debit and credit cells are empty".to_string(),
            }),
            (Some(_), Some(_)) => Err(IngestError::Normalization {
                field: "amount".to_string(),
                detail: "row has values in both debit and credit columns".to_string(),
            }),
        }
    }

    fn required_cell<'r>(
        &self,
        record: &'r RawRecord,
        col: usize,
        field: &str,
    ) -> Result<&'r str, IngestError> {
        match non_empty(record.cell(col)) {
            Some(cell) => Ok(cell),
            None => Err(IngestError::Normalization {
                field: field.to_string(),
                detail: format!("missing required cell (column {col}, line {})", record.line),
            }),
        }
    }
}

fn non_empty(cell: Option<&str>) -> Option<&str> {
    cell.map(str::trim).filter(|s| !s.is_empty())
}

/// A debit/credit marker column overrides the parsed sign; unknown markers
/// leave it alone.
fn apply_type_marker(minor: i64, marker: &str) -> i64 {
    match marker.trim().to_lowercase().as_str() {
        "debit" | "dr" | "withdrawal" => -minor.abs(),
        "credit" | "cr" | "deposit" => minor.abs(),
        _ => minor,
    }
}

/// Walk the ordered format list; the first match wins. The result is marked
/// ambiguous when a later format reads the same string as a different date
/// (classic 01/02/2024 day/month confusion) — flagged, never guessed
/// silently.
pub fn parse_date(s: &str, formats: &[String]) -> Result<(NaiveDate, bool), IngestError> {
    use chrono::Datelike;

    let s = s.trim();
    let mut first_match: Option<NaiveDate> = None;
    let mut ambiguous = false;

    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            // A variable-width %Y happily reads "15-01-24" as year 15;
            // no bank statement predates 1950.
            if !(1950..=2100).contains(&date.year()) {
                continue;
            }
            match first_match {
                None => first_match = Some(date),
                Some(winner) if winner != date => {
                    ambiguous = true;
                    break;
                }
                Some(_) => {}
            }
        }
    }

    match first_match {
        Some(date) => Ok((date, ambiguous)),
        None => Err(IngestError::Normalization {
            field: "date".to_string(),
            detail: format!("unparsable date '{s}'"),
        }),
    }
}

/// Locale cleanup + exact decimal conversion to minor units. Handles
/// currency symbols, thousands separators, accounting parentheses and
/// trailing CR/DR markers.
pub fn parse_amount(s: &str) -> Result<i64, String> {
    let mut s = s.trim().to_string();

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    let upper = s.to_uppercase();
    if let Some(stripped) = upper.strip_suffix("DR") {
        negative = true;
        s = stripped.trim().to_string();
    } else if let Some(stripped) = upper.strip_suffix("CR") {
        s = stripped.trim().to_string();
    }

    let stripped: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ' ' | '\u{a0}'))
        .collect();
    let cleaned = normalize_separators(&stripped);
    if cleaned.is_empty() {
        return Err(format!("unparsable amount '{}'", s.trim()));
    }

    let mut dec = Decimal::from_str(&cleaned).map_err(|_| format!("unparsable amount '{cleaned}'"))?;
    if negative {
        dec = -dec;
    }
    (dec * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| format!("amount out of range '{cleaned}'"))
}

/// Resolve `.`/`,` roles: whichever separator appears last is the decimal
/// point ("1.234,56" vs "1,234.56"); a lone comma followed by exactly two
/// digits is a decimal comma ("99,99"), otherwise commas group thousands.
fn normalize_separators(s: &str) -> String {
    match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => {
            s.replace('.', "").replace(',', ".")
        }
        (Some(_), _) => s.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = s.len() - comma - 1;
            if decimals == 2 && s.matches(',').count() == 1 {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (None, None) => s.to_string(),
    }
}
