//! Deterministic, offline keyword-scoring classifier.
//!
//! The cheapest rung of the categorization ladder: a fixed table of
//! category keyword lists scored against the merchant key and the free-text
//! description. Pure function, no I/O, safe to call unboundedly.
//!
//! The table is an ordered slice, not a map: ties are broken by declaration
//! order, and a hash-ordered structure would make results flap between runs.

use crate::models::MerchantKey;

/// Score for an exact (case-insensitive) merchant-key match.
const SCORE_KEY_EXACT: u32 = 100;

/// Score when the merchant key contains the keyword.
const SCORE_KEY_CONTAINS: u32 = 50;

/// Score when the free-text description contains the keyword.
const SCORE_DESCRIPTION_CONTAINS: u32 = 10;

/// One category and its keyword list, curated for Australian bank feeds.
pub struct CategoryKeywords {
    pub category: &'static str,
    pub keywords: &'static [&'static str],
}

/// The keyword table, in tie-break order. Keywords are lowercase.
pub const KEYWORD_TABLE: &[CategoryKeywords] = &[
    CategoryKeywords {
        category: "Groceries",
        keywords: &[
            "woolworths",
            "coles",
            "aldi",
            "iga",
            "foodworks",
            "harris farm",
            "costco",
            "grocer",
            "supermarket",
            "butcher",
            "fruit market",
        ],
    },
    CategoryKeywords {
        category: "Dining & Takeaway",
        keywords: &[
            "uber eats",
            "menulog",
            "deliveroo",
            "doordash",
            "mcdonald",
            "kfc",
            "hungry jack",
            "domino",
            "subway",
            "nando",
            "guzman",
            "grill'd",
            "sushi",
            "kebab",
            "pizza",
            "cafe",
            "coffee",
            "restaurant",
            "bakery",
            "bistro",
            "noodle",
        ],
    },
    CategoryKeywords {
        category: "Fuel & Automotive",
        keywords: &[
            "bp",
            "shell",
            "caltex",
            "ampol",
            "7-eleven",
            "united petroleum",
            "petrol",
            "fuel",
            "servo",
            "supercheap",
            "repco",
            "autobarn",
            "mechanic",
            "carwash",
        ],
    },
    CategoryKeywords {
        category: "Transport",
        keywords: &[
            "uber",
            "didi",
            "taxi",
            "cabcharge",
            "opal",
            "myki",
            "translink",
            "parking",
            "linkt",
            "toll",
            "train",
        ],
    },
    CategoryKeywords {
        category: "Utilities & Telco",
        keywords: &[
            "agl",
            "origin energy",
            "energyaustralia",
            "telstra",
            "optus",
            "vodafone",
            "tpg",
            "belong",
            "electricity",
            "energy",
            "water",
            "council",
            "internet",
            "broadband",
        ],
    },
    CategoryKeywords {
        category: "Subscriptions & Entertainment",
        keywords: &[
            "netflix",
            "spotify",
            "stan",
            "disney",
            "binge",
            "kayo",
            "audible",
            "youtube",
            "prime video",
            "playstation",
            "xbox",
            "steam",
            "cinema",
            "hoyts",
            "ticketek",
            "ticketmaster",
            "patreon",
        ],
    },
    CategoryKeywords {
        category: "Shopping",
        keywords: &[
            "amazon",
            "ebay",
            "kmart",
            "target",
            "big w",
            "myer",
            "david jones",
            "bunnings",
            "ikea",
            "officeworks",
            "jb hi-fi",
            "harvey norman",
            "kogan",
            "temu",
            "uniqlo",
            "cotton on",
        ],
    },
    CategoryKeywords {
        category: "Health & Fitness",
        keywords: &[
            "chemist",
            "pharmacy",
            "priceline",
            "terry white",
            "medical",
            "dental",
            "physio",
            "gym",
            "fitness",
            "medicare",
            "optometrist",
        ],
    },
    CategoryKeywords {
        category: "Insurance",
        keywords: &[
            "insurance",
            "aami",
            "allianz",
            "nrma",
            "youi",
            "qbe",
            "medibank",
            "bupa",
            "hcf",
            "nib",
        ],
    },
    CategoryKeywords {
        category: "Housing & Rent",
        keywords: &[
            "rent",
            "real estate",
            "ray white",
            "lj hooker",
            "strata",
            "mortgage",
            "body corporate",
        ],
    },
    CategoryKeywords {
        category: "Travel",
        keywords: &[
            "qantas",
            "jetstar",
            "virgin australia",
            "airbnb",
            "booking.com",
            "expedia",
            "hotel",
            "motel",
            "hostel",
            "flight centre",
            "webjet",
            "cruise",
        ],
    },
    CategoryKeywords {
        category: "Personal Care",
        keywords: &["hairdresser", "barber", "salon", "nails", "beauty", "massage"],
    },
];

/// Classify a merchant by keyword scoring.
///
/// For each category, sums over its keywords: +100 if the merchant key
/// equals the keyword (case-insensitive), +50 if the key contains it, and
/// +10 if the description contains it (the description is scored
/// independently, so contributions accumulate). Highest total wins; ties go
/// to the earlier table entry. Returns `None` when every category scores
/// zero.
pub fn classify_by_keywords(key: &MerchantKey, description: &str) -> Option<&'static str> {
    let key_lower = key.as_str().to_lowercase();
    let desc_lower = description.to_lowercase();

    let mut best: Option<(&'static str, u32)> = None;
    for entry in KEYWORD_TABLE {
        let mut score = 0u32;
        for keyword in entry.keywords {
            if key_lower == *keyword {
                score += SCORE_KEY_EXACT;
            } else if key_lower.contains(keyword) {
                score += SCORE_KEY_CONTAINS;
            }
            if desc_lower.contains(keyword) {
                score += SCORE_DESCRIPTION_CONTAINS;
            }
        }
        match best {
            // Strictly-greater keeps the first declared category on ties.
            Some((_, top)) if top >= score => {}
            _ if score > 0 => best = Some((entry.category, score)),
            _ => {}
        }
    }

    best.map(|(category, _)| category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::is_known_category;

    fn classify(key: &str, description: &str) -> Option<&'static str> {
        classify_by_keywords(&MerchantKey::from(key), description)
    }

    #[test]
    fn test_table_categories_are_in_vocabulary() {
        for entry in KEYWORD_TABLE {
            assert!(
                is_known_category(entry.category),
                "{} missing from vocabulary",
                entry.category
            );
        }
    }

    #[test]
    fn test_table_keywords_are_lowercase() {
        for entry in KEYWORD_TABLE {
            for kw in entry.keywords {
                assert_eq!(*kw, kw.to_lowercase(), "keyword not lowercase: {kw}");
            }
        }
    }

    #[test]
    fn test_woolworths_wins_groceries() {
        assert_eq!(classify("WOOLWORTHS", ""), Some("Groceries"));
        assert_eq!(
            classify("WOOLWORTHS", "WOOLWORTHS TOWN HALL 123"),
            Some("Groceries")
        );
    }

    #[test]
    fn test_uber_eats_beats_uber() {
        // "UBER EATS" matches the dining keyword exactly (+100) and the
        // transport keyword "uber" only by containment (+50).
        assert_eq!(
            classify("UBER EATS", "UBER EATS SYDNEY"),
            Some("Dining & Takeaway")
        );
        assert_eq!(classify("UBER", "UBER *TRIP HELP.UBER.COM"), Some("Transport"));
    }

    #[test]
    fn test_description_only_match() {
        assert_eq!(
            classify("LUIGIS", "wood fired pizza restaurant"),
            Some("Dining & Takeaway")
        );
    }

    #[test]
    fn test_description_accumulates_with_key() {
        // Key containment (+50) and description hit (+10) stack.
        assert_eq!(classify("NETFLIX AU", "NETFLIX.COM"), Some("Subscriptions & Entertainment"));
    }

    #[test]
    fn test_no_match_returns_none() {
        assert_eq!(classify("ACME UNKNOWN", "ACME UNKNOWN 42"), None);
        assert_eq!(classify("", ""), None);
    }

    #[test]
    fn test_tie_breaks_by_declaration_order() {
        // "agl" (+50 contains) vs "rent" (+50 contains): equal totals, so the
        // earlier table entry wins.
        assert_eq!(classify("AGL RENT", ""), Some("Utilities & Telco"));
    }

    #[test]
    fn test_deterministic_across_calls() {
        let inputs = [
            ("WOOLWORTHS", "weekly shop"),
            ("UBER EATS", "UBER EATS SYDNEY"),
            ("BP", "BP NORTHSIDE"),
            ("ACME UNKNOWN", ""),
        ];
        for (key, desc) in inputs {
            let first = classify(key, desc);
            for _ in 0..10 {
                assert_eq!(classify(key, desc), first);
            }
        }
    }

    #[test]
    fn test_fuel_examples() {
        assert_eq!(classify("BP", "BP NORTHSIDE"), Some("Fuel & Automotive"));
        assert_eq!(classify("AMPOL", "AMPOL FOODARY 123"), Some("Fuel & Automotive"));
    }

    #[test]
    fn test_exact_match_outscores_containment_elsewhere() {
        // "shell" exact (+100) must beat any single containment hit.
        assert_eq!(classify("SHELL", ""), Some("Fuel & Automotive"));
    }
}
