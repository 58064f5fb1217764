//! Merchant key derivation from raw transaction descriptions.
//!
//! Bank feeds attach location codes, store numbers, and legal-entity noise to
//! merchant names ("WOOLWORTHS TOWN HALL 123", "NETFLIX.COM"). The normalizer
//! reduces those to a canonical [`MerchantKey`] so heuristics, mappings, and
//! jobs all join on the same string.
//!
//! Normalization is pure and deterministic: the same input always yields the
//! same key, and applying it to an already-canonical name is stable.

use crate::models::MerchantKey;

/// Maximum key length for the final truncation fallback.
const MAX_KEY_LEN: usize = 50;

/// Domain suffixes stripped from the end of a description.
/// Longer suffixes first so ".COM.AU" wins over ".COM".
const DOMAIN_SUFFIXES: &[&str] = &[".COM.AU", ".NET.AU", ".ORG.AU", ".COM", ".NET", ".ORG"];

/// Trailing corporate-entity and storefront words stripped token by token.
const ENTITY_SUFFIXES: &[&str] = &["STORE", "BRANCH", "OUTLET", "LTD", "PTY", "LIMITED", "INC"];

/// Curated list of known merchant names, uppercase and canonical.
///
/// Order matters twice: it is the tie-break for substring matches, and
/// compound names must precede their prefixes ("UBER EATS" before "UBER")
/// so the more specific merchant wins.
pub const KNOWN_MERCHANTS: &[&str] = &[
    // Groceries
    "WOOLWORTHS",
    "COLES",
    "ALDI",
    "IGA",
    "COSTCO",
    "HARRIS FARM",
    "FOODWORKS",
    // Dining and delivery (compounds before prefixes)
    "UBER EATS",
    "MENULOG",
    "DELIVEROO",
    "DOORDASH",
    "MCDONALDS",
    "HUNGRY JACKS",
    "KFC",
    "DOMINOS",
    "SUBWAY",
    "GUZMAN Y GOMEZ",
    "NANDOS",
    "GRILL'D",
    "STARBUCKS",
    "GLORIA JEANS",
    // Rideshare and transport
    "UBER",
    "DIDI",
    "OLA",
    "CABCHARGE",
    // Fuel
    "BP",
    "SHELL",
    "CALTEX",
    "AMPOL",
    "7-ELEVEN",
    "UNITED PETROLEUM",
    // Streaming and subscriptions
    "NETFLIX",
    "SPOTIFY",
    "STAN",
    "DISNEY",
    "BINGE",
    "KAYO",
    "AUDIBLE",
    "YOUTUBE",
    "APPLE",
    "GOOGLE",
    // Telco and utilities
    "TELSTRA",
    "OPTUS",
    "VODAFONE",
    "TPG",
    "AGL",
    "ORIGIN ENERGY",
    "ENERGYAUSTRALIA",
    // Retail
    "KMART",
    "TARGET",
    "BIG W",
    "MYER",
    "DAVID JONES",
    "BUNNINGS",
    "IKEA",
    "OFFICEWORKS",
    "JB HI-FI",
    "HARVEY NORMAN",
    "AMAZON",
    "EBAY",
    "KOGAN",
    // Travel
    "QANTAS",
    "JETSTAR",
    "VIRGIN AUSTRALIA",
    "AIRBNB",
    "FLIGHT CENTRE",
    // Health and insurance
    "CHEMIST WAREHOUSE",
    "PRICELINE",
    "TERRY WHITE",
    "MEDIBANK",
    "BUPA",
    "NIB",
    "ANYTIME FITNESS",
];

/// Reduce a raw transaction description to a canonical merchant key.
///
/// Steps, in order:
/// 1. uppercase and trim;
/// 2. strip one trailing domain suffix (".COM", ".COM.AU", ...);
/// 3. drop trailing numeric tokens (store and location codes);
/// 4. drop trailing corporate-entity words ("PTY", "LTD", "STORE", ...);
/// 5. first substring match against [`KNOWN_MERCHANTS`] wins;
/// 6. otherwise a two-token prefix match against the same list;
/// 7. otherwise the first whitespace/hyphen/slash token, if longer than 2;
/// 8. otherwise the cleaned string truncated to 50 characters.
pub fn normalize_merchant(description: &str) -> MerchantKey {
    let mut text = description.trim().to_uppercase();

    for suffix in DOMAIN_SUFFIXES {
        if let Some(stripped) = text.strip_suffix(suffix) {
            text = stripped.to_string();
            break;
        }
    }

    let mut tokens: Vec<&str> = text.split_whitespace().collect();

    while let Some(last) = tokens.last() {
        if is_numeric_token(last) {
            tokens.pop();
        } else {
            break;
        }
    }

    while let Some(last) = tokens.last() {
        if ENTITY_SUFFIXES.contains(last) && tokens.len() > 1 {
            tokens.pop();
        } else {
            break;
        }
    }

    let cleaned = if tokens.is_empty() {
        text.clone()
    } else {
        tokens.join(" ")
    };

    for merchant in KNOWN_MERCHANTS {
        if cleaned.contains(merchant) {
            return MerchantKey::from(*merchant);
        }
    }

    if tokens.len() >= 2 {
        let prefix = format!("{} {}", tokens[0], tokens[1]);
        for merchant in KNOWN_MERCHANTS {
            if merchant.starts_with(&prefix) {
                return MerchantKey::from(*merchant);
            }
        }
    }

    if let Some(first) = cleaned
        .split(|c| c == ' ' || c == '-' || c == '/')
        .find(|t| !t.is_empty())
    {
        if first.len() > 2 {
            return MerchantKey::from(first);
        }
    }

    MerchantKey(cleaned.chars().take(MAX_KEY_LEN).collect())
}

/// Whether a token is a store/location code: all digits, optionally
/// prefixed with '#'.
fn is_numeric_token(token: &str) -> bool {
    let digits = token.strip_prefix('#').unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
