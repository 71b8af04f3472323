/// Uppercase a merchant string and strip the per-store noise banks append:
/// `#4521` store numbers, trailing reference digits, punctuation runs.
/// "STARBUCKS #4521" and "Starbucks 0042" both normalize to "STARBUCKS".
pub fn normalize_vendor(s: &str) -> String {
    let upper = s.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_alphanumeric() && c != '&' && c != '-')
        .filter(|w| !w.is_empty())
        // Pure-numeric tokens are store/reference numbers, not the name.
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect();
    words.join(" ")
}

pub fn tokenize(s: &str) -> Vec<String> {
    s.to_uppercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Jaccard-style token overlap in [0.0, 1.0]: shared tokens over the
/// smaller token set, so "STARBUCKS" against "STARBUCKS STORE 4521"
/// still scores 1.0.
pub fn token_overlap_ratio(a: &str, b: &str) -> f32 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let (small, large) = if ta.len() <= tb.len() { (&ta, &tb) } else { (&tb, &ta) };
    let shared = small.iter().filter(|t| large.contains(t)).count();
    shared as f32 / small.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_strips_store_numbers() {
        assert_eq!(normalize_vendor("STARBUCKS #4521"), "STARBUCKS");
        assert_eq!(normalize_vendor("Starbucks 0042"), "STARBUCKS");
        assert_eq!(normalize_vendor("WHOLE FOODS MKT 123"), "WHOLE FOODS MKT");
    }

    #[test]
    fn vendor_keeps_alphanumeric_names() {
        assert_eq!(normalize_vendor("7-ELEVEN 32711"), "7-ELEVEN");
        assert_eq!(normalize_vendor("H&M"), "H&M");
    }

    #[test]
    fn vendor_of_garbage_is_empty() {
        assert_eq!(normalize_vendor("#### 1234"), "");
    }

    #[test]
    fn overlap_identical_is_one() {
        assert_eq!(token_overlap_ratio("AMAZON MARKETPLACE", "AMAZON MARKETPLACE"), 1.0);
    }

    #[test]
    fn overlap_subset_scores_full() {
        assert_eq!(token_overlap_ratio("STARBUCKS", "STARBUCKS STORE 4521"), 1.0);
    }

    #[test]
    fn overlap_disjoint_is_zero() {
        assert_eq!(token_overlap_ratio("AMAZON", "STARBUCKS"), 0.0);
    }

    #[test]
    fn overlap_partial() {
        let r = token_overlap_ratio("UBER TRIP HELP", "UBER EATS");
        assert!(r > 0.0 && r < 1.0, "ratio was {r}");
    }

    #[test]
    fn overlap_empty_is_zero() {
        assert_eq!(token_overlap_ratio("", "AMAZON"), 0.0);
        assert_eq!(token_overlap_ratio("", ""), 0.0);
    }

    #[test]
    fn overlap_is_case_insensitive() {
        assert_eq!(token_overlap_ratio("amazon", "AMAZON"), 1.0);
    }
}
