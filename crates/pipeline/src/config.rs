use serde::{Deserialize, Serialize};

/// Single source of truth for every threshold and timeout in the pipeline.
/// Loadable from TOML; the defaults below are the documented baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Format detection below this confidence rejects the upload.
    pub detection_floor: f32,
    /// Classifier stages below this confidence leave the item uncategorized.
    pub classifier_floor: f32,
    /// Rows extracted below this confidence are flagged for review.
    pub review_threshold: f32,
    /// Near-duplicate search window, days either side.
    pub near_duplicate_window_days: i64,
    /// Token-overlap ratio two descriptions need to count as near-duplicates.
    pub near_duplicate_similarity: f32,
    /// Exact reconciliation matches tolerate this many days of drift.
    pub reconcile_exact_window_days: i64,
    pub reconcile_fuzzy_window_days: i64,
    pub reconcile_fuzzy_overlap: f32,
    /// Structured formats (CSV/OFX/QIF) get a short leash.
    pub structured_timeout_secs: u64,
    /// OCR and PDF extraction block on external engines.
    pub ocr_timeout_secs: u64,
    /// Statements processed concurrently; stages inside one statement are
    /// always sequential.
    pub max_concurrent_statements: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_floor: 0.5,
            classifier_floor: 0.6,
            review_threshold: 0.7,
            near_duplicate_window_days: 2,
            near_duplicate_similarity: 0.6,
            reconcile_exact_window_days: 1,
            reconcile_fuzzy_window_days: 3,
            reconcile_fuzzy_overlap: 0.5,
            structured_timeout_secs: 10,
            ocr_timeout_secs: 60,
            max_concurrent_statements: 4,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse pipeline config: {e}"))
    }

    pub fn duplicate_detector(&self) -> statera_matching::DuplicateDetector {
        statera_matching::DuplicateDetector::new(
            self.near_duplicate_window_days,
            self.near_duplicate_similarity,
        )
    }

    pub fn reconciliation_matcher(&self) -> statera_matching::ReconciliationMatcher {
        statera_matching::ReconciliationMatcher::new(
            self.reconcile_exact_window_days,
            self.reconcile_fuzzy_window_days,
            self.reconcile_fuzzy_overlap,
        )
    }
}
