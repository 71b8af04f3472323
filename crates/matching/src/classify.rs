use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statera_core::{CategoryKeyword, VendorCategoryMapping, DEFAULT_KEYWORDS, UNCATEGORIZED};

use crate::util::normalize_vendor;

/// Which cascade stage produced the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierStage {
    VendorLookup,
    KeywordScore,
    PatternMatch,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub confidence: f32,
    pub stage: ClassifierStage,
}

impl Classification {
    fn uncategorized() -> Self {
        Classification {
            category: UNCATEGORIZED.to_string(),
            confidence: 0.0,
            stage: ClassifierStage::Unmatched,
        }
    }
}

/// Regex signature for the fallback stage, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub category: String,
    pub confidence: f32,
}

struct CompiledPattern {
    rule: PatternRule,
    regex: regex::Regex,
}

/// Built-in fallback signatures for merchants the keyword table misses.
pub const DEFAULT_PATTERNS: &[(&str, &str, f32)] = &[
    (r"(?i)\bAMZN\b|AMAZON", "Shopping", 0.75),
    (r"(?i)\bPAYPAL\b", "Shopping", 0.65),
    (r"(?i)PAYROLL|DIRECT DEP", "Income", 0.8),
    (r"(?i)\bACH\b.*(TRANSFER|PMT)", "Transfers", 0.7),
    (r"(?i)NETFLIX|SPOTIFY|HULU|DISNEY\+", "Entertainment", 0.85),
    (r"(?i)\bIKEA\b|HOME DEPOT|LOWE'?S", "Home", 0.8),
    (r"(?i)U-?HAUL|AIRBNB|EXPEDIA", "Travel", 0.8),
    (r"(?i)\b(CVS|WALGREENS|RITE AID)\b", "Health", 0.8),
];

/// Deterministic three-stage cascade over an in-memory snapshot of the
/// vendor/keyword tables. The snapshot is company-scoped and read-only —
/// learning happens through the storage layer's atomic upsert, never here.
pub struct CategoryClassifier {
    vendors: HashMap<String, VendorCategoryMapping>,
    keywords: Vec<CategoryKeyword>,
    patterns: Vec<CompiledPattern>,
    confidence_floor: f32,
}

impl CategoryClassifier {
    pub fn new(
        vendors: Vec<VendorCategoryMapping>,
        keywords: Vec<CategoryKeyword>,
        patterns: Vec<PatternRule>,
        confidence_floor: f32,
    ) -> Self {
        let vendors = vendors
            .into_iter()
            .map(|m| (m.vendor.clone(), m))
            .collect();
        let patterns = patterns
            .into_iter()
            .filter_map(|rule| {
                regex::Regex::new(&rule.pattern)
                    .ok()
                    .map(|regex| CompiledPattern { rule, regex })
            })
            .collect();
        Self { vendors, keywords, patterns, confidence_floor }
    }

    /// Snapshot with the seed keyword set and built-in patterns.
    pub fn with_defaults(vendors: Vec<VendorCategoryMapping>, confidence_floor: f32) -> Self {
        let keywords = DEFAULT_KEYWORDS
            .iter()
            .map(|(k, c, w)| CategoryKeyword::new(k, c, *w))
            .collect();
        Self::new(vendors, keywords, default_patterns(), confidence_floor)
    }

    /// First confident stage wins; below the floor the item stays
    /// uncategorized and is queued for manual review.
    pub fn classify(&self, description: &str) -> Classification {
        if let Some(c) = self.vendor_lookup(description) {
            if c.confidence >= self.confidence_floor {
                return c;
            }
        }
        if let Some(c) = self.keyword_score(description) {
            if c.confidence >= self.confidence_floor {
                return c;
            }
        }
        if let Some(c) = self.pattern_match(description) {
            if c.confidence >= self.confidence_floor {
                return c;
            }
        }
        Classification::uncategorized()
    }

    fn vendor_lookup(&self, description: &str) -> Option<Classification> {
        let vendor = normalize_vendor(description);
        let mapping = self.vendors.get(&vendor)?;
        Some(Classification {
            category: mapping.category.clone(),
            // An exact vendor hit is trusted even if the learned row is new.
            confidence: mapping.confidence.max(0.9),
            stage: ClassifierStage::VendorLookup,
        })
    }

    fn keyword_score(&self, description: &str) -> Option<Classification> {
        let text = description.to_lowercase();
        let mut scores: HashMap<&str, f32> = HashMap::new();
        for kw in &self.keywords {
            if text.contains(kw.keyword.as_str()) {
                *scores.entry(kw.category.as_str()).or_insert(0.0) += kw.weight;
            }
        }
        if scores.is_empty() {
            return None;
        }

        let total: f32 = scores.values().sum();
        let (category, score) = scores
            .into_iter()
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Deterministic winner when two categories tie.
                    .then_with(|| a.0.cmp(b.0))
            })?;

        // Winning category's share of the matched weight, damped by the
        // absolute match strength.
        let confidence = (score / total) * score.min(1.0);
        Some(Classification {
            category: category.to_string(),
            confidence,
            stage: ClassifierStage::KeywordScore,
        })
    }

    fn pattern_match(&self, description: &str) -> Option<Classification> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(description))
            .map(|p| Classification {
                category: p.rule.category.clone(),
                confidence: p.rule.confidence,
                stage: ClassifierStage::PatternMatch,
            })
    }
}

/// The built-in signature set as rule structs.
pub fn default_patterns() -> Vec<PatternRule> {
    DEFAULT_PATTERNS
        .iter()
        .map(|(p, c, conf)| PatternRule {
            pattern: p.to_string(),
            category: c.to_string(),
            confidence: *conf,
        })
        .collect()
}

/// Parse a `[[pattern]]` TOML document of fallback rules.
pub fn load_patterns(toml_content: &str) -> Result<Vec<PatternRule>, String> {
    #[derive(Deserialize)]
    struct PatternFile {
        #[serde(default)]
        pattern: Vec<PatternRule>,
    }
    let file: PatternFile =
        toml::from_str(toml_content).map_err(|e| format!("Failed to parse patterns: {e}"))?;
    Ok(file.pattern)
}
