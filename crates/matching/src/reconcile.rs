use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statera_core::{Money, Transaction, TransactionId};

use crate::util::token_overlap_ratio;

/// An independently submitted expense record (external collaborator data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: i64,
    pub date: NaiveDate,
    pub vendor: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPair {
    pub transaction_id: TransactionId,
    pub expense_id: i64,
    pub kind: MatchKind,
    pub confidence: f32,
}

/// Matched pairs plus everything left over on both sides — unmatched items
/// are reported, never force-matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub matches: Vec<MatchPair>,
    pub unmatched_transactions: Vec<TransactionId>,
    pub unmatched_expenses: Vec<i64>,
}

/// One-to-one matcher. Exact: identical amount, dates within ±1 day.
/// Fuzzy: identical amount, dates within ±3 days, vendor token overlap
/// over the threshold. Highest-confidence pairs are assigned first; ties
/// break on the earliest imported date, then ids.
pub struct ReconciliationMatcher {
    pub exact_window_days: i64,
    pub fuzzy_window_days: i64,
    pub fuzzy_overlap_threshold: f32,
}

impl Default for ReconciliationMatcher {
    fn default() -> Self {
        Self {
            exact_window_days: 1,
            fuzzy_window_days: 3,
            fuzzy_overlap_threshold: 0.5,
        }
    }
}

struct Candidate {
    tx_idx: usize,
    expense_idx: usize,
    kind: MatchKind,
    confidence: f32,
    tx_date: NaiveDate,
}

impl ReconciliationMatcher {
    pub fn new(
        exact_window_days: i64,
        fuzzy_window_days: i64,
        fuzzy_overlap_threshold: f32,
    ) -> Self {
        Self { exact_window_days, fuzzy_window_days, fuzzy_overlap_threshold }
    }

    pub fn reconcile(
        &self,
        transactions: &[Transaction],
        expenses: &[ExpenseRecord],
    ) -> ReconciliationReport {
        let mut candidates = Vec::new();
        for (ti, tx) in transactions.iter().enumerate() {
            for (ei, exp) in expenses.iter().enumerate() {
                if let Some((kind, confidence)) = self.score_pair(tx, exp) {
                    candidates.push(Candidate {
                        tx_idx: ti,
                        expense_idx: ei,
                        kind,
                        confidence,
                        tx_date: tx.date,
                    });
                }
            }
        }

        // Greedy assignment, best first; stable order keeps ties deterministic.
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.tx_date.cmp(&b.tx_date))
                .then_with(|| a.tx_idx.cmp(&b.tx_idx))
                .then_with(|| a.expense_idx.cmp(&b.expense_idx))
        });

        let mut tx_taken = vec![false; transactions.len()];
        let mut expense_taken = vec![false; expenses.len()];
        let mut matches = Vec::new();

        for c in candidates {
            if tx_taken[c.tx_idx] || expense_taken[c.expense_idx] {
                continue;
            }
            tx_taken[c.tx_idx] = true;
            expense_taken[c.expense_idx] = true;
            matches.push(MatchPair {
                transaction_id: transactions[c.tx_idx]
                    .id
                    .unwrap_or(TransactionId(c.tx_idx as i64)),
                expense_id: expenses[c.expense_idx].id,
                kind: c.kind,
                confidence: c.confidence,
            });
        }

        let unmatched_transactions = transactions
            .iter()
            .enumerate()
            .filter(|(i, _)| !tx_taken[*i])
            .map(|(i, t)| t.id.unwrap_or(TransactionId(i as i64)))
            .collect();
        let unmatched_expenses = expenses
            .iter()
            .enumerate()
            .filter(|(i, _)| !expense_taken[*i])
            .map(|(_, e)| e.id)
            .collect();

        ReconciliationReport { matches, unmatched_transactions, unmatched_expenses }
    }

    fn score_pair(&self, tx: &Transaction, exp: &ExpenseRecord) -> Option<(MatchKind, f32)> {
        // Expenses are positive spend; imported outflows are negative.
        if tx.amount.abs() != exp.amount.abs() {
            return None;
        }
        let date_diff = (tx.date - exp.date).num_days().abs();

        if date_diff <= self.exact_window_days {
            let confidence = if date_diff == 0 { 1.0 } else { 0.95 };
            return Some((MatchKind::Exact, confidence));
        }

        if date_diff <= self.fuzzy_window_days {
            let overlap = token_overlap_ratio(&tx.description, &exp.vendor);
            if overlap >= self.fuzzy_overlap_threshold {
                let date_score =
                    1.0 - date_diff as f32 / (self.fuzzy_window_days + 1) as f32;
                let confidence = 0.5 * overlap + 0.4 * date_score;
                return Some((MatchKind::Fuzzy, confidence));
            }
        }

        None
    }
}
