//! # tally-inference
//!
//! AI classification backend for the tally categorization engine.
//!
//! This crate provides:
//! - An OpenAI-compatible [`GenerationBackend`] implementation
//! - [`MerchantClassifier`], which wraps any backend with the categorization
//!   prompt, vocabulary validation, and in-call rate-limit retry
//! - A scripted mock backend for deterministic tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_core::MerchantKey;
//! use tally_inference::{MerchantClassifier, OpenAIBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(OpenAIBackend::from_env()?);
//!     let classifier = MerchantClassifier::new(backend);
//!
//!     let outcome = classifier
//!         .classify(&MerchantKey::from("WOOLWORTHS"), "WOOLWORTHS TOWN HALL 123")
//!         .await?;
//!     println!("{}", outcome.category);
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod mock;
pub mod openai;

pub use classifier::{ClassificationOutcome, MerchantClassifier};
pub use mock::MockGenerationBackend;
pub use openai::{OpenAIBackend, OpenAIConfig};

// Re-export the backend trait so consumers need not depend on tally-core
// directly for it.
pub use tally_core::GenerationBackend;
