use serde::{Deserialize, Serialize};

/// Learned vendor → category association, company-scoped. Grows from
/// corrections via atomic upsert-and-increment; pure counting, no model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorCategoryMapping {
    pub company_id: i64,
    /// Normalized vendor name (uppercased, store numbers stripped).
    pub vendor: String,
    pub category: String,
    pub confidence: f32,
    pub usage_count: i64,
}

/// Weighted keyword used by the classifier's second stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryKeyword {
    pub keyword: String,
    pub category: String,
    pub weight: f32,
}

impl CategoryKeyword {
    pub fn new(keyword: &str, category: &str, weight: f32) -> Self {
        CategoryKeyword {
            keyword: keyword.to_string(),
            category: category.to_string(),
            weight,
        }
    }
}

/// Static seed set; administrators may extend it through storage.
pub const DEFAULT_KEYWORDS: &[(&str, &str, f32)] = &[
    ("coffee", "Meals", 0.8),
    ("restaurant", "Meals", 0.9),
    ("cafe", "Meals", 0.8),
    ("pizza", "Meals", 0.9),
    ("grill", "Meals", 0.7),
    ("doordash", "Meals", 0.9),
    ("grubhub", "Meals", 0.9),
    ("grocery", "Groceries", 0.9),
    ("market", "Groceries", 0.5),
    ("supermarket", "Groceries", 0.9),
    ("airlines", "Travel", 0.9),
    ("airways", "Travel", 0.9),
    ("hotel", "Travel", 0.8),
    ("motel", "Travel", 0.8),
    ("uber", "Travel", 0.6),
    ("lyft", "Travel", 0.6),
    ("rental", "Travel", 0.5),
    ("parking", "Travel", 0.7),
    ("fuel", "Vehicle", 0.8),
    ("gas", "Vehicle", 0.5),
    ("shell", "Vehicle", 0.7),
    ("chevron", "Vehicle", 0.8),
    ("pharmacy", "Health", 0.9),
    ("clinic", "Health", 0.8),
    ("dental", "Health", 0.9),
    ("insurance", "Insurance", 0.9),
    ("premium", "Insurance", 0.4),
    ("subscription", "Software", 0.6),
    ("hosting", "Software", 0.8),
    ("cloud", "Software", 0.5),
    ("github", "Software", 0.9),
    ("adobe", "Software", 0.9),
    ("electric", "Utilities", 0.8),
    ("water", "Utilities", 0.6),
    ("internet", "Utilities", 0.7),
    ("wireless", "Utilities", 0.7),
    ("payroll", "Income", 0.9),
    ("salary", "Income", 0.9),
    ("deposit", "Income", 0.4),
    ("interest", "Income", 0.6),
    ("atm", "Cash", 0.9),
    ("withdrawal", "Cash", 0.7),
    ("fee", "Bank Fees", 0.7),
    ("overdraft", "Bank Fees", 0.9),
    ("office", "Office Supplies", 0.6),
    ("staples", "Office Supplies", 0.8),
    ("postage", "Office Supplies", 0.8),
];

/// Category assigned when no classifier stage clears the confidence floor.
pub const UNCATEGORIZED: &str = "uncategorized";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_keywords_have_sane_weights() {
        for (keyword, category, weight) in DEFAULT_KEYWORDS {
            assert!(!keyword.is_empty());
            assert!(!category.is_empty());
            assert!(*weight > 0.0 && *weight <= 1.0, "{keyword}: {weight}");
        }
    }

    #[test]
    fn seed_keywords_are_lowercase() {
        for (keyword, _, _) in DEFAULT_KEYWORDS {
            assert_eq!(*keyword, keyword.to_lowercase());
        }
    }
}
