use chrono::NaiveDate;
use statera_core::IngestError;

use crate::record::{RawRecord, RowSource};

/// Fixed cell order for block formats (OFX/QIF): no column guessing.
pub const BLOCK_CELLS: [&str; 5] = ["date", "description", "amount", "memo", "check_number"];

/// Statement envelope metadata from the OFX wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct OfxEnvelope {
    pub account_id: String,
    pub bank_id: Option<String>,
    pub account_type: Option<String>,
    pub currency: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// OFX 1.x SGML extractor. Scans `<TAG>value` lines; `<STMTTRN>` blocks
/// accumulate into one row each, in document order.
pub struct OfxExtractor;

impl OfxExtractor {
    pub fn envelope(data: &[u8]) -> Result<OfxEnvelope, IngestError> {
        let content = String::from_utf8_lossy(data);
        let mut envelope = OfxEnvelope {
            account_id: String::new(),
            bank_id: None,
            account_type: None,
            currency: None,
            start_date: None,
            end_date: None,
        };

        for line in content.lines() {
            if let Some((tag, value)) = tag_value(line) {
                match tag.as_str() {
                    "ACCTID" => envelope.account_id = value.to_string(),
                    "BANKID" => envelope.bank_id = Some(value.to_string()),
                    "ACCTTYPE" => envelope.account_type = Some(value.to_string()),
                    "CURDEF" => envelope.currency = Some(value.to_string()),
                    "DTSTART" => envelope.start_date = parse_ofx_date(value),
                    "DTEND" => envelope.end_date = parse_ofx_date(value),
                    _ => {}
                }
            }
        }

        if envelope.account_id.is_empty() {
            return Err(IngestError::MalformedInput {
                line: 0,
                detail: "missing <ACCTID>".to_string(),
            });
        }
        Ok(envelope)
    }

    fn parse_rows(data: &[u8]) -> Vec<Result<RawRecord, IngestError>> {
        let content = String::from_utf8_lossy(data);
        let mut rows = Vec::new();
        let mut current: Option<BuildingRow> = None;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;
            let Some((tag, value)) = tag_value(raw_line) else {
                continue;
            };

            match tag.as_str() {
                "STMTTRN" => current = Some(BuildingRow::at(line_no)),
                "/STMTTRN" => {
                    if let Some(row) = current.take() {
                        rows.push(row.finish());
                    }
                }
                _ => {
                    if let Some(ref mut row) = current {
                        match tag.as_str() {
                            "DTPOSTED" => row.date = parse_ofx_date(value),
                            "TRNAMT" => row.amount = Some(value.to_string()),
                            "NAME" => row.name = Some(value.to_string()),
                            "MEMO" => row.memo = Some(value.to_string()),
                            "CHECKNUM" => row.check_number = Some(value.to_string()),
                            _ => {}
                        }
                    }
                }
            }
        }

        rows
    }
}

impl RowSource for OfxExtractor {
    fn rows<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Box<dyn Iterator<Item = Result<RawRecord, IngestError>> + 'a> {
        Box::new(Self::parse_rows(data).into_iter())
    }
}

struct BuildingRow {
    line: u32,
    date: Option<NaiveDate>,
    amount: Option<String>,
    name: Option<String>,
    memo: Option<String>,
    check_number: Option<String>,
}

impl BuildingRow {
    fn at(line: u32) -> Self {
        BuildingRow {
            line,
            date: None,
            amount: None,
            name: None,
            memo: None,
            check_number: None,
        }
    }

    fn finish(self) -> Result<RawRecord, IngestError> {
        let date = self.date.ok_or_else(|| IngestError::MalformedInput {
            line: self.line,
            detail: "transaction block missing <DTPOSTED>".to_string(),
        })?;
        let amount = self.amount.ok_or_else(|| IngestError::MalformedInput {
            line: self.line,
            detail: "transaction block missing <TRNAMT>".to_string(),
        })?;
        // NAME is the payee; MEMO supplements it when NAME is absent.
        let description = self.name.or_else(|| self.memo.clone()).unwrap_or_default();
        Ok(RawRecord::new(
            vec![
                date.format("%Y-%m-%d").to_string(),
                description,
                amount,
                self.memo.unwrap_or_default(),
                self.check_number.unwrap_or_default(),
            ],
            self.line,
        ))
    }
}

/// Split `<TAG>value` / `<TAG>` lines; returns the uppercased tag name.
fn tag_value(line: &str) -> Option<(String, &str)> {
    let line = line.trim();
    let rest = line.strip_prefix('<')?;
    match rest.split_once('>') {
        Some((name, value)) => Some((name.trim().to_uppercase(), value.trim())),
        None => Some((rest.trim_end_matches('>').trim().to_uppercase(), "")),
    }
}

/// OFX datetimes lead with YYYYMMDD; time and zone suffixes are ignored
/// (e.g. `20240115120000[-5:EST]`).
fn parse_ofx_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() < 8 || !s[..8].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let y: i32 = s[0..4].parse().ok()?;
    let m: u32 = s[4..6].parse().ok()?;
    let d: u32 = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"OFXHEADER:100
DATA:OFXSGML
VERSION:102

<OFX>
<BANKMSGSRSV1>
<STMTTRNRS>
<STMTRS>
<CURDEF>USD
<BANKACCTFROM>
<BANKID>123456789
<ACCTID>000112345
<ACCTTYPE>CHECKING
</BANKACCTFROM>
<BANKTRANLIST>
<DTSTART>20240101
<DTEND>20240131
<STMTTRN>
<TRNTYPE>DEBIT
<DTPOSTED>20240115120000[-5:EST]
<TRNAMT>-49.99
<FITID>TXN001
<NAME>AMAZON MARKETPLACE
<MEMO>Online purchase
</STMTTRN>
<STMTTRN>
<TRNTYPE>CREDIT
<DTPOSTED>20240120
<TRNAMT>1500.00
<FITID>TXN002
<NAME>DIRECT DEPOSIT
</STMTTRN>
</BANKTRANLIST>
</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>
"#;

    #[test]
    fn envelope_fields() {
        let env = OfxExtractor::envelope(SAMPLE.as_bytes()).unwrap();
        assert_eq!(env.account_id, "000112345");
        assert_eq!(env.bank_id.as_deref(), Some("123456789"));
        assert_eq!(env.account_type.as_deref(), Some("CHECKING"));
        assert_eq!(env.currency.as_deref(), Some("USD"));
        assert_eq!(env.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(env.end_date, NaiveDate::from_ymd_opt(2024, 1, 31));
    }

    #[test]
    fn envelope_requires_account_id() {
        let err = OfxExtractor::envelope(b"<OFX><CURDEF>USD</OFX>").unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));
    }

    #[test]
    fn rows_in_document_order() {
        let rows: Vec<_> = OfxExtractor
            .rows(SAMPLE.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells[0], "2024-01-15");
        assert_eq!(rows[0].cells[1], "AMAZON MARKETPLACE");
        assert_eq!(rows[0].cells[2], "-49.99");
        assert_eq!(rows[0].cells[3], "Online purchase");
        assert_eq!(rows[1].cells[0], "2024-01-20");
        assert_eq!(rows[1].cells[2], "1500.00");
    }

    #[test]
    fn time_and_zone_suffix_ignored() {
        assert_eq!(
            parse_ofx_date("20240115120000[-5:EST]"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(parse_ofx_date("20240115"), NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(parse_ofx_date("not-a-date"), None);
    }

    #[test]
    fn memo_substitutes_for_missing_name() {
        let data = b"<STMTTRN>\n<DTPOSTED>20240110\n<TRNAMT>-3.00\n<MEMO>COFFEE\n</STMTTRN>\n";
        let rows: Vec<_> = OfxExtractor
            .rows(data)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].cells[1], "COFFEE");
    }

    #[test]
    fn missing_amount_is_malformed_with_line() {
        let data = b"<STMTTRN>\n<DTPOSTED>20240110\n<NAME>X\n</STMTTRN>\n";
        let err = OfxExtractor
            .rows(data)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        match err {
            IngestError::MalformedInput { line, detail } => {
                assert_eq!(line, 1);
                assert!(detail.contains("TRNAMT"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn restartable() {
        let a: Vec<_> = OfxExtractor
            .rows(SAMPLE.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let b: Vec<_> = OfxExtractor
            .rows(SAMPLE.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(a, b);
    }
}
