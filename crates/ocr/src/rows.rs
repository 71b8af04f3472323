use statera_core::IngestError;
use statera_ingest::pdf::detect_table_rows;
use statera_ingest::record::{RawRecord, RowSource};

use crate::preprocess;
use crate::recognizer::OcrBackend;

/// Statement-row extractor for photographed or scanned pages: preprocess →
/// recognize → table detection. Per-row confidence is the text-shape score
/// scaled by the page's image quality; weak rows are kept for review, never
/// dropped.
pub struct OcrRowExtractor<R: OcrBackend> {
    recognizer: R,
}

impl<R: OcrBackend> OcrRowExtractor<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    fn extract(&self, data: &[u8]) -> Result<Vec<RawRecord>, IngestError> {
        let prepared = preprocess::prepare_page(data).map_err(|e| {
            IngestError::ExternalToolFailure {
                tool: "image preprocessing".to_string(),
                detail: e.to_string(),
            }
        })?;

        let text = self.recognizer.recognize(&prepared.png)?;

        // A perfect page keeps the shape score; a poor one drags every row
        // down toward the review threshold.
        let scale = 0.5 + 0.5 * prepared.quality;
        Ok(detect_table_rows(&text)
            .into_iter()
            .map(|r| {
                let confidence = r.confidence * scale;
                RawRecord::with_confidence(r.cells, r.line, confidence)
            })
            .collect())
    }
}

impl<R: OcrBackend> RowSource for OcrRowExtractor<R> {
    fn rows<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Box<dyn Iterator<Item = Result<RawRecord, IngestError>> + 'a> {
        match self.extract(data) {
            Ok(rows) => Box::new(rows.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}
