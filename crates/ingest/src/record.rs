use statera_core::IngestError;

/// One extracted row: an ordered list of string cells plus provenance.
/// Extractors never drop rows — uncertain ones carry a low confidence and
/// are flagged for review downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub cells: Vec<String>,
    /// 1-based source line (or record ordinal for block formats).
    pub line: u32,
    /// Extraction confidence, 1.0 for structured formats.
    pub confidence: f32,
}

impl RawRecord {
    pub fn new(cells: Vec<String>, line: u32) -> Self {
        RawRecord { cells, line, confidence: 1.0 }
    }

    pub fn with_confidence(cells: Vec<String>, line: u32, confidence: f32) -> Self {
        RawRecord { cells, line, confidence: confidence.clamp(0.0, 1.0) }
    }

    pub fn cell(&self, idx: usize) -> Option<&str> {
        self.cells.get(idx).map(String::as_str)
    }
}

/// Contract shared by every extractor: a finite, restartable pass over the
/// validated bytes. Each `rows` call starts a fresh iteration.
pub trait RowSource {
    fn rows<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Box<dyn Iterator<Item = Result<RawRecord, IngestError>> + 'a>;
}
