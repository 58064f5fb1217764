//! The fixed spending-category vocabulary.
//!
//! Every classification path (heuristics, crowd mappings, AI) resolves to one
//! of these names. The list is ordered: heuristic tie-breaks and prompt
//! construction both rely on declaration order staying stable.

/// The full category vocabulary, in declaration order.
///
/// `Other` is last and doubles as the fallback for anything the provider
/// returns that cannot be matched.
pub const CATEGORIES: &[&str] = &[
    "Groceries",
    "Dining & Takeaway",
    "Fuel & Automotive",
    "Transport",
    "Utilities & Telco",
    "Subscriptions & Entertainment",
    "Shopping",
    "Health & Fitness",
    "Insurance",
    "Housing & Rent",
    "Travel",
    "Personal Care",
    "Other",
];

/// Category assigned when no other signal is available.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Whether `name` is exactly one of the known categories.
pub fn is_known_category(name: &str) -> bool {
    CATEGORIES.contains(&name)
}

/// Match free-form provider output against the vocabulary.
///
/// Tries, in order: exact match, case-insensitive match, then case-insensitive
/// containment in either direction (the provider sometimes pads the category
/// with prose like "Category: Groceries."). Returns `None` when nothing in
/// the vocabulary relates to the text.
pub fn match_category(text: &str) -> Option<&'static str> {
    let trimmed = text.trim().trim_matches(|c| c == '"' || c == '.');
    if trimmed.is_empty() {
        return None;
    }

    if let Some(cat) = CATEGORIES.iter().find(|c| **c == trimmed) {
        return Some(cat);
    }

    let lower = trimmed.to_lowercase();
    CATEGORIES
        .iter()
        .find(|c| {
            let cl = c.to_lowercase();
            cl == lower || lower.contains(&cl) || cl.contains(&lower)
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_ends_with_other() {
        assert_eq!(*CATEGORIES.last().unwrap(), FALLBACK_CATEGORY);
    }

    #[test]
    fn test_vocabulary_is_unique() {
        let mut sorted: Vec<&str> = CATEGORIES.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), CATEGORIES.len());
    }

    #[test]
    fn test_is_known_category() {
        assert!(is_known_category("Groceries"));
        assert!(is_known_category("Other"));
        assert!(!is_known_category("groceries"));
        assert!(!is_known_category("Crypto"));
    }

    #[test]
    fn test_match_exact() {
        assert_eq!(match_category("Groceries"), Some("Groceries"));
        assert_eq!(match_category("  Travel \n"), Some("Travel"));
    }

    #[test]
    fn test_match_case_insensitive() {
        assert_eq!(match_category("groceries"), Some("Groceries"));
        assert_eq!(match_category("DINING & TAKEAWAY"), Some("Dining & Takeaway"));
    }

    #[test]
    fn test_match_containment() {
        assert_eq!(
            match_category("Category: Groceries."),
            Some("Groceries")
        );
        assert_eq!(
            match_category("I would classify this as Transport"),
            Some("Transport")
        );
    }

    #[test]
    fn test_match_unknown() {
        assert_eq!(match_category("Cryptocurrency"), None);
        assert_eq!(match_category(""), None);
        assert_eq!(match_category("   "), None);
    }
}
