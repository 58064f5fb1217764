//! # tally-core
//!
//! Core types, traits, and abstractions for the tally categorization engine.
//!
//! This crate provides the foundational data structures, the merchant
//! normalizer, and the offline heuristic classifier that other tally crates
//! depend on.

pub mod categories;
pub mod defaults;
pub mod error;
pub mod heuristics;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod traits;

// Re-export commonly used types at crate root
pub use categories::{is_known_category, CATEGORIES, FALLBACK_CATEGORY};
pub use error::{Error, Result};
pub use heuristics::classify_by_keywords;
pub use models::*;
pub use normalizer::normalize_merchant;
pub use traits::*;
