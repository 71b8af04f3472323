use statera_core::IngestError;

use crate::record::{RawRecord, RowSource};

/// QIF extractor. Records are single-letter-coded lines terminated by `^`:
/// `D` date, `T`/`U` amount, `P` payee, `M` memo, `N` check number. The
/// leading `!Type:` header names the account kind and carries no rows.
pub struct QifExtractor;

impl QifExtractor {
    /// The declared account type from the `!Type:` header, if present.
    pub fn account_type(data: &[u8]) -> Option<String> {
        let content = String::from_utf8_lossy(data);
        content.lines().find_map(|l| {
            l.trim().strip_prefix("!Type:").map(|t| t.trim().to_string())
        })
    }

    fn parse_rows(data: &[u8]) -> Vec<Result<RawRecord, IngestError>> {
        let content = String::from_utf8_lossy(data);
        let mut rows = Vec::new();
        let mut current: Option<BuildingRow> = None;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('!') {
                continue;
            }

            if line == "^" {
                if let Some(row) = current.take() {
                    rows.push(row.finish());
                }
                continue;
            }

            let mut chars = line.chars();
            let code = chars.next().unwrap_or(' ');
            let value = chars.as_str().trim();
            let row = current.get_or_insert_with(|| BuildingRow::at(line_no));
            match code {
                'D' => row.date = Some(normalize_qif_date(value)),
                // U duplicates T in investment exports; T wins when both appear.
                'T' => row.amount = Some(value.to_string()),
                'U' => {
                    if row.amount.is_none() {
                        row.amount = Some(value.to_string());
                    }
                }
                'P' => row.payee = Some(value.to_string()),
                'M' => row.memo = Some(value.to_string()),
                'N' => row.check_number = Some(value.to_string()),
                // Cleared flags, categories, addresses and splits are not
                // part of the canonical row.
                _ => {}
            }
        }

        // A trailing record without its `^` terminator still counts.
        if let Some(row) = current.take() {
            rows.push(row.finish());
        }

        rows
    }
}

impl RowSource for QifExtractor {
    fn rows<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Box<dyn Iterator<Item = Result<RawRecord, IngestError>> + 'a> {
        Box::new(Self::parse_rows(data).into_iter())
    }
}

struct BuildingRow {
    line: u32,
    date: Option<String>,
    amount: Option<String>,
    payee: Option<String>,
    memo: Option<String>,
    check_number: Option<String>,
}

impl BuildingRow {
    fn at(line: u32) -> Self {
        BuildingRow {
            line,
            date: None,
            amount: None,
            payee: None,
            memo: None,
            check_number: None,
        }
    }

    fn finish(self) -> Result<RawRecord, IngestError> {
        let date = self.date.ok_or_else(|| IngestError::MalformedInput {
            line: self.line,
            detail: "QIF record missing D (date) line".to_string(),
        })?;
        let amount = self.amount.ok_or_else(|| IngestError::MalformedInput {
            line: self.line,
            detail: "QIF record missing T (amount) line".to_string(),
        })?;
        let description = self.payee.or_else(|| self.memo.clone()).unwrap_or_default();
        Ok(RawRecord::new(
            vec![
                date,
                description,
                amount,
                self.memo.unwrap_or_default(),
                self.check_number.unwrap_or_default(),
            ],
            self.line,
        ))
    }
}

/// Quicken writes two-digit years with an apostrophe ("1/15'24"); rewrite
/// to a plain separator so the normalizer's format list applies.
fn normalize_qif_date(s: &str) -> String {
    s.replace('\'', "/").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "!Type:Bank\n\
D01/15/2024\n\
T-5.50\n\
PSTARBUCKS #4521\n\
MLatte\n\
^\n\
D01/20/2024\n\
T1500.00\n\
PDIRECT DEPOSIT\n\
N1042\n\
^\n";

    #[test]
    fn account_type_from_header() {
        assert_eq!(QifExtractor::account_type(SAMPLE.as_bytes()).as_deref(), Some("Bank"));
        assert_eq!(QifExtractor::account_type(b"D01/01/2024\nT1\n^"), None);
    }

    #[test]
    fn parses_records_between_carets() {
        let rows: Vec<_> = QifExtractor
            .rows(SAMPLE.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells[0], "01/15/2024");
        assert_eq!(rows[0].cells[1], "STARBUCKS #4521");
        assert_eq!(rows[0].cells[2], "-5.50");
        assert_eq!(rows[0].cells[3], "Latte");
        assert_eq!(rows[1].cells[4], "1042");
    }

    #[test]
    fn record_line_is_where_it_started() {
        let rows: Vec<_> = QifExtractor
            .rows(SAMPLE.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 7);
    }

    #[test]
    fn apostrophe_year_normalized() {
        let data = b"!Type:Bank\nD1/15'24\nT-1.00\nPX\n^\n";
        let rows: Vec<_> = QifExtractor
            .rows(data.as_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].cells[0], "1/15/24");
    }

    #[test]
    fn u_amount_is_fallback_only() {
        let data = b"!Type:Invst\nD1/2/2024\nU9.99\nT10.00\nPX\n^\n";
        let rows: Vec<_> = QifExtractor
            .rows(data.as_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].cells[2], "10.00");
    }

    #[test]
    fn missing_terminator_still_yields_last_record() {
        let data = b"!Type:Bank\nD01/15/2024\nT-2.00\nPX\n";
        let rows: Vec<_> = QifExtractor
            .rows(data.as_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn missing_date_reports_record_line() {
        let data = b"!Type:Bank\nT-2.00\nPX\n^\n";
        let err = QifExtractor
            .rows(data.as_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        match err {
            IngestError::MalformedInput { line, detail } => {
                assert_eq!(line, 2);
                assert!(detail.contains("date"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn memo_substitutes_for_missing_payee() {
        let data = b"!Type:Bank\nD01/15/2024\nT-2.00\nMcash withdrawal\n^\n";
        let rows: Vec<_> = QifExtractor
            .rows(data.as_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].cells[1], "cash withdrawal");
    }
}
