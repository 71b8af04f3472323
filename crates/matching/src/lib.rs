pub mod classify;
pub mod dedup;
pub mod fingerprint;
pub mod reconcile;
pub mod util;

pub use classify::{
    default_patterns, load_patterns, CategoryClassifier, Classification, ClassifierStage,
    PatternRule, DEFAULT_PATTERNS,
};
pub use dedup::DuplicateDetector;
pub use fingerprint::{fingerprint, sha256_bytes, to_hex, DESCRIPTION_PREFIX_LEN};
pub use reconcile::{
    ExpenseRecord, MatchKind, MatchPair, ReconciliationMatcher, ReconciliationReport,
};
pub use util::{normalize_vendor, token_overlap_ratio, tokenize};
