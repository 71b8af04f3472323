pub mod csv;
pub mod detect;
pub mod normalize;
pub mod ofx;
pub mod pdf;
pub mod profile;
pub mod qif;
pub mod record;

pub use csv::{CsvExtractor, CsvOptions};
pub use detect::{detect, detect_or_reject, Detection};
pub use normalize::{ColumnMapping, DraftTransaction, Normalizer, DEFAULT_DATE_FORMATS};
pub use ofx::{OfxEnvelope, OfxExtractor};
pub use pdf::{MockPdfEngine, PdfTableExtractor, PdfTextEngine, PdftotextEngine};
pub use profile::{detect_known_profile, infer_mapping, load_profiles, BankProfile};
pub use qif::QifExtractor;
pub use record::{RawRecord, RowSource};
