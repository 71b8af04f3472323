use statera_core::{DuplicateFlag, Transaction};

use crate::util::token_overlap_ratio;

/// Flags duplicates within one statement. Exact duplicates share a
/// fingerprint; near duplicates share an amount, land within the date
/// window and clear the description-similarity threshold. The detector
/// only ever flags — deletion is a human decision.
pub struct DuplicateDetector {
    pub near_window_days: i64,
    pub similarity_threshold: f32,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self { near_window_days: 2, similarity_threshold: 0.6 }
    }
}

impl DuplicateDetector {
    pub fn new(near_window_days: i64, similarity_threshold: f32) -> Self {
        Self { near_window_days, similarity_threshold }
    }

    /// Recompute every flag from scratch. Running this twice over the same
    /// transactions yields the same result — flags derive from fingerprints
    /// and content alone.
    pub fn flag_duplicates(&self, transactions: &mut [Transaction]) {
        for tx in transactions.iter_mut() {
            tx.duplicate = DuplicateFlag::None;
        }

        for i in 0..transactions.len() {
            if transactions[i].duplicate.is_duplicate() {
                continue;
            }
            for j in (i + 1)..transactions.len() {
                if transactions[j].duplicate.is_duplicate() {
                    continue;
                }

                // The earlier transaction stays clean; later copies get flagged.
                if transactions[i].fingerprint == transactions[j].fingerprint {
                    transactions[j].duplicate = DuplicateFlag::Exact;
                    continue;
                }

                if let Some(similarity) = self.near_score(&transactions[i], &transactions[j]) {
                    transactions[j].duplicate = DuplicateFlag::Possible(similarity);
                }
            }
        }
    }

    fn near_score(&self, a: &Transaction, b: &Transaction) -> Option<f32> {
        if a.amount != b.amount {
            return None;
        }
        let date_diff = (a.date - b.date).num_days().abs();
        if date_diff > self.near_window_days {
            return None;
        }
        let similarity = token_overlap_ratio(&a.description, &b.description);
        (similarity >= self.similarity_threshold).then_some(similarity)
    }
}
