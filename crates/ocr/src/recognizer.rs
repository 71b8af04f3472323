use statera_core::IngestError;

/// Abstraction over an OCR engine. Implementations accept normalized PNG
/// bytes and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, IngestError>;
}

impl OcrBackend for std::sync::Arc<dyn OcrBackend> {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, IngestError> {
        (**self).recognize(image_bytes)
    }
}

/// Returns a pre-set string — lets the row extraction be tested without
/// Tesseract installed.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, IngestError> {
        Ok(self.text.clone())
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::OcrBackend;
    use leptess::LepTess;
    use statera_core::IngestError;

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, IngestError> {
            let fail = |detail: String| IngestError::ExternalToolFailure {
                tool: "tesseract".to_string(),
                detail,
            };
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| fail(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| fail(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| fail(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_preset_text() {
        let r = MockRecognizer::new("01/15/2024  COFFEE  -5.50");
        assert_eq!(r.recognize(b"fake image data").unwrap(), "01/15/2024  COFFEE  -5.50");
    }

    #[test]
    fn mock_ignores_image_content() {
        let r = MockRecognizer::new("hello");
        assert_eq!(r.recognize(b"anything").unwrap(), "hello");
        assert_eq!(r.recognize(b"").unwrap(), "hello");
    }
}
