pub mod preprocess;
pub mod recognizer;
pub mod rows;

pub use preprocess::{prepare_page, PreparedImage, PreprocessError};
pub use recognizer::{MockRecognizer, OcrBackend};
pub use rows::OcrRowExtractor;

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
