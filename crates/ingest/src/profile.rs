use serde::{Deserialize, Serialize};

use crate::csv::CsvOptions;
use crate::normalize::{ColumnMapping, Normalizer};
use statera_core::Currency;

/// Per-bank format template, supplied as data (TOML), never code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankProfile {
    pub name: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_header_rows")]
    pub header_rows: u32,
    /// Ordered date formats to try; empty means the built-in fallback list.
    #[serde(default)]
    pub date_formats: Vec<String>,
    pub mapping: ColumnMapping,
    /// Set for banks that export charges positive (card statements).
    #[serde(default)]
    pub negate_amounts: bool,
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_header_rows() -> u32 {
    1
}

impl BankProfile {
    pub fn csv_options(&self) -> CsvOptions {
        CsvOptions {
            delimiter: self.delimiter.as_bytes().first().copied().unwrap_or(b','),
            header_rows: self.header_rows,
        }
    }

    pub fn normalizer(&self, currency: Currency) -> Normalizer {
        Normalizer::new(self.mapping.clone(), currency)
            .with_date_formats(self.date_formats.clone())
            .with_negated_amounts(self.negate_amounts)
    }
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profile: Vec<BankProfile>,
}

/// Parse a `[[profile]]` TOML document.
pub fn load_profiles(toml_content: &str) -> Result<Vec<BankProfile>, String> {
    let file: ProfileFile =
        toml::from_str(toml_content).map_err(|e| format!("Failed to parse profiles: {e}"))?;
    Ok(file.profile)
}

/// Known bank CSV fingerprints for auto-detection from header cells.
pub fn detect_known_profile(headers: &[String]) -> Option<BankProfile> {
    let h: Vec<String> = headers
        .iter()
        .map(|s| s.to_lowercase().trim().to_string())
        .collect();

    // American Express: "Card Member" column; charges exported positive.
    if h.contains(&"card member".into()) {
        return Some(BankProfile {
            name: "American Express".into(),
            delimiter: ",".into(),
            header_rows: 1,
            date_formats: vec!["%m/%d/%Y".into()],
            mapping: ColumnMapping {
                date_column: col(&h, "date").unwrap_or(0),
                description_column: col(&h, "description").unwrap_or(1),
                amount_column: col(&h, "amount"),
                debit_column: None,
                credit_column: None,
                balance_column: None,
                type_column: None,
            },
            negate_amounts: true,
        });
    }

    // Bank of America checking: "Running Bal." column.
    if h.iter().any(|s| s.contains("running bal")) {
        return Some(BankProfile {
            name: "Bank of America Checking".into(),
            delimiter: ",".into(),
            header_rows: 1,
            date_formats: vec!["%m/%d/%Y".into()],
            mapping: ColumnMapping {
                date_column: col(&h, "date").unwrap_or(0),
                description_column: col(&h, "description").unwrap_or(1),
                amount_column: col(&h, "amount"),
                debit_column: None,
                credit_column: None,
                balance_column: h.iter().position(|s| s.contains("running bal")),
                type_column: None,
            },
            negate_amounts: false,
        });
    }

    // Citi: leading "Status" plus separate Debit/Credit columns.
    if h.first().map(String::as_str) == Some("status")
        && h.contains(&"debit".into())
        && h.contains(&"credit".into())
    {
        return Some(BankProfile {
            name: "Citi".into(),
            delimiter: ",".into(),
            header_rows: 1,
            date_formats: vec!["%m/%d/%Y".into()],
            mapping: ColumnMapping {
                date_column: col(&h, "date").unwrap_or(1),
                description_column: col(&h, "description").unwrap_or(2),
                amount_column: None,
                debit_column: col(&h, "debit"),
                credit_column: col(&h, "credit"),
                balance_column: None,
                type_column: None,
            },
            negate_amounts: false,
        });
    }

    // Chase checking: "Details" plus "Check or Slip #".
    if h.contains(&"details".into()) && h.iter().any(|s| s.contains("check or slip")) {
        return Some(BankProfile {
            name: "Chase Checking".into(),
            delimiter: ",".into(),
            header_rows: 1,
            date_formats: vec!["%m/%d/%Y".into()],
            mapping: ColumnMapping {
                date_column: col(&h, "posting date").unwrap_or(1),
                description_column: col(&h, "description").unwrap_or(2),
                amount_column: col(&h, "amount"),
                debit_column: None,
                credit_column: None,
                balance_column: col(&h, "balance"),
                type_column: col(&h, "type"),
            },
            negate_amounts: false,
        });
    }

    // Capital One checking: "Transaction Amount" with leading account column.
    if h.first().map(String::as_str) == Some("account number")
        && h.contains(&"transaction amount".into())
    {
        return Some(BankProfile {
            name: "Capital One Checking".into(),
            delimiter: ",".into(),
            header_rows: 1,
            date_formats: vec!["%m/%d/%Y".into()],
            mapping: ColumnMapping {
                date_column: col(&h, "transaction date").unwrap_or(1),
                description_column: col(&h, "transaction description").unwrap_or(4),
                amount_column: col(&h, "transaction amount"),
                debit_column: None,
                credit_column: None,
                balance_column: col(&h, "balance"),
                type_column: None,
            },
            negate_amounts: false,
        });
    }

    // Discover: "Trans. Date" with trailing period.
    if h.iter().any(|s| s.contains("trans. date")) {
        return Some(BankProfile {
            name: "Discover".into(),
            delimiter: ",".into(),
            header_rows: 1,
            date_formats: vec!["%m/%d/%Y".into()],
            mapping: ColumnMapping {
                date_column: 0,
                description_column: col(&h, "description").unwrap_or(2),
                amount_column: col(&h, "amount"),
                debit_column: None,
                credit_column: None,
                balance_column: None,
                type_column: None,
            },
            negate_amounts: true,
        });
    }

    None
}

fn col(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

/// Best-effort column identification for CSVs from unknown banks: match
/// header names against the usual role vocabulary. Returns `None` when no
/// date or amount column can be found — the caller must ask for an
/// explicit mapping instead of guessing blind.
pub fn infer_mapping(headers: &[String]) -> Option<ColumnMapping> {
    let h: Vec<String> = headers.iter().map(|s| s.to_lowercase().trim().to_string()).collect();

    let find = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| h.iter().position(|header| header.contains(n)))
    };

    let date_column = find(&["date"])?;
    let description_column =
        find(&["description", "payee", "merchant", "name", "memo"]).unwrap_or(date_column + 1);

    let debit_column = find(&["debit", "withdrawal"]);
    let credit_column = find(&["credit", "deposit"]);
    let amount_column = find(&["amount"]);
    if amount_column.is_none() && (debit_column.is_none() || credit_column.is_none()) {
        return None;
    }

    Some(ColumnMapping {
        date_column,
        description_column,
        // An explicit amount column beats a half-present debit/credit pair.
        amount_column,
        debit_column: if amount_column.is_none() { debit_column } else { None },
        credit_column: if amount_column.is_none() { credit_column } else { None },
        balance_column: find(&["balance", "running bal"]),
        type_column: find(&["type"]),
    })
}
