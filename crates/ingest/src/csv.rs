use statera_core::IngestError;

use crate::record::{RawRecord, RowSource};

/// CSV extraction options. Column roles are not decided here — the
/// normalizer applies a [`crate::profile::BankProfile`] mapping afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Number of leading rows to skip (headers, bank boilerplate).
    pub header_rows: u32,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions { delimiter: b',', header_rows: 1 }
    }
}

pub struct CsvExtractor {
    options: CsvOptions,
}

impl CsvExtractor {
    pub fn new(options: CsvOptions) -> Self {
        CsvExtractor { options }
    }

    /// Peek at the leading rows without consuming the data — used for
    /// bank-profile detection against header fingerprints.
    pub fn sample(&self, data: &[u8], rows: usize) -> Result<Vec<Vec<String>>, IngestError> {
        let mut reader = self.reader(data);
        let mut out = Vec::new();
        let mut record = csv::ByteRecord::new();
        while out.len() < rows {
            match reader.read_byte_record(&mut record) {
                Ok(true) => out.push(decode_cells(&record)),
                Ok(false) => break,
                Err(e) => return Err(malformed(&e)),
            }
        }
        Ok(out)
    }

    fn reader<'a>(&self, data: &'a [u8]) -> csv::Reader<&'a [u8]> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .from_reader(data)
    }
}

impl RowSource for CsvExtractor {
    fn rows<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Box<dyn Iterator<Item = Result<RawRecord, IngestError>> + 'a> {
        let reader = self.reader(data);
        let skip = self.options.header_rows as usize;
        let iter = reader
            .into_byte_records()
            .skip(skip)
            .filter_map(move |result| match result {
                Ok(record) => {
                    if record.iter().all(|c| c.is_empty()) {
                        return None; // blank separator rows carry no data
                    }
                    let line = record.position().map(|p| p.line() as u32).unwrap_or(0);
                    Some(Ok(RawRecord::new(decode_cells(&record), line)))
                }
                Err(e) => Some(Err(malformed(&e))),
            });
        Box::new(iter)
    }
}

/// Cells arrive as raw bytes; decode UTF-8 with a lossy fallback so
/// Latin-1 exports from older bank portals do not abort the import.
fn decode_cells(record: &csv::ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|c| String::from_utf8_lossy(c).trim().to_string())
        .collect()
}

fn malformed(e: &csv::Error) -> IngestError {
    let line = match e.position() {
        Some(p) => p.line() as u32,
        None => 0,
    };
    IngestError::MalformedInput { line, detail: e.to_string() }
}
