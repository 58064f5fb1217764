//! Merchant classification over a generation backend.
//!
//! Wraps any [`GenerationBackend`] with the categorization prompt, response
//! validation against the category vocabulary, and in-call retry on provider
//! rate limiting. Durable retry across minutes lives in the job queue; the
//! backoff here only rides out a momentary 429 inside one job attempt.

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use tally_core::categories::{match_category, CATEGORIES, FALLBACK_CATEGORY};
use tally_core::defaults::{AI_BACKOFF_BASE_MS, AI_BACKOFF_CAP_MS};
use tally_core::{Error, GenerationBackend, MerchantKey, Result};

/// Outcome of one classification, including how hard we had to try.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    /// Validated category, always from the vocabulary.
    pub category: String,
    /// Raw model output, kept for the mapping's audit trail. `None` when the
    /// provider call failed and the category is a local fallback.
    pub raw_response: Option<String>,
    /// Provider calls made, including the successful one.
    pub attempts: u32,
    /// Backoff delays actually slept, in order.
    pub delays_ms: Vec<u64>,
    /// Whether the call that produced the category succeeded. False only
    /// when the category is the fallback standing in for a provider failure.
    pub final_attempt_succeeded: bool,
}

impl ClassificationOutcome {
    /// Whether the provider had to be called more than once.
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Classifies merchants by prompting a generation backend.
pub struct MerchantClassifier {
    backend: Arc<dyn GenerationBackend>,
}

impl MerchantClassifier {
    /// Create a new classifier over the given backend.
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Build the classification prompt for a merchant.
    ///
    /// The model is asked for exactly one category name from the closed
    /// vocabulary; everything else is prompt-side context.
    pub fn build_prompt(key: &MerchantKey, description: &str) -> String {
        let vocabulary = CATEGORIES.join(", ");
        format!(
            "Categorize this bank transaction merchant into exactly one category.\n\
             \n\
             Merchant: {key}\n\
             Transaction description: {description}\n\
             \n\
             Categories: {vocabulary}\n\
             \n\
             Respond with only the category name, nothing else."
        )
    }

    /// Classify with a single provider call.
    ///
    /// Rate limiting propagates as [`Error::RateLimited`]; any other
    /// provider failure degrades to the fallback category so interactive
    /// callers get an answer instead of an error. A response that validates
    /// against no vocabulary entry likewise degrades to the fallback.
    pub async fn classify(&self, key: &MerchantKey, description: &str) -> Result<ClassificationOutcome> {
        let prompt = Self::build_prompt(key, description);
        match self.backend.generate(&prompt).await {
            Ok(raw) => Ok(Self::validate(key, raw, 1, Vec::new())),
            Err(err @ Error::RateLimited { .. }) => Err(err),
            Err(err) => {
                warn!(
                    subsystem = "inference",
                    merchant_key = %key,
                    error = %err,
                    "Provider call failed, using fallback category"
                );
                Ok(ClassificationOutcome {
                    category: FALLBACK_CATEGORY.to_string(),
                    raw_response: None,
                    attempts: 1,
                    delays_ms: Vec::new(),
                    final_attempt_succeeded: false,
                })
            }
        }
    }

    /// Classify, sleeping out transient 429s up to `max_retries` extra calls.
    ///
    /// The delay before retry `n` (zero-based) is `min(base * 2^n, cap)`.
    /// Only rate limiting is retried; other errors are not transient in a
    /// way a short sleep would fix.
    pub async fn classify_with_retry(
        &self,
        key: &MerchantKey,
        description: &str,
        max_retries: u32,
    ) -> Result<ClassificationOutcome> {
        let prompt = Self::build_prompt(key, description);

        let mut attempt = 0u32;
        let mut delays_ms = Vec::new();
        loop {
            match self.backend.generate(&prompt).await {
                Ok(raw) => return Ok(Self::validate(key, raw, attempt + 1, delays_ms)),
                Err(err @ Error::RateLimited { .. }) => {
                    if attempt >= max_retries {
                        return Err(err);
                    }
                    let delay_ms =
                        (AI_BACKOFF_BASE_MS.saturating_mul(1 << attempt)).min(AI_BACKOFF_CAP_MS);
                    warn!(
                        subsystem = "inference",
                        merchant_key = %key,
                        attempt = attempt + 1,
                        delay_ms,
                        "Provider rate limited, backing off"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                    delays_ms.push(delay_ms);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn validate(
        key: &MerchantKey,
        raw: String,
        attempts: u32,
        delays_ms: Vec<u64>,
    ) -> ClassificationOutcome {
        let category = match match_category(&raw) {
            Some(category) => category.to_string(),
            None => {
                warn!(
                    subsystem = "inference",
                    merchant_key = %key,
                    raw = %raw.trim(),
                    "Model response outside vocabulary, using fallback"
                );
                FALLBACK_CATEGORY.to_string()
            }
        };

        debug!(
            subsystem = "inference",
            merchant_key = %key,
            category = %category,
            attempts,
            "Classified merchant"
        );

        ClassificationOutcome {
            category,
            raw_response: Some(raw),
            attempts,
            delays_ms,
            final_attempt_succeeded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGenerationBackend;

    fn classifier(mock: &MockGenerationBackend) -> MerchantClassifier {
        MerchantClassifier::new(Arc::new(mock.clone()))
    }

    #[test]
    fn test_prompt_contains_vocabulary_and_merchant() {
        let prompt = MerchantClassifier::build_prompt(
            &MerchantKey::from("WOOLWORTHS"),
            "WOOLWORTHS TOWN HALL 123",
        );
        assert!(prompt.contains("WOOLWORTHS"));
        assert!(prompt.contains("Groceries"));
        assert!(prompt.contains("Other"));
    }

    #[tokio::test]
    async fn test_valid_response_passes_through() {
        let mock = MockGenerationBackend::new().with_response("Groceries");
        let outcome = classifier(&mock)
            .classify(&MerchantKey::from("WOOLWORTHS"), "weekly shop")
            .await
            .unwrap();
        assert_eq!(outcome.category, "Groceries");
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.retried());
    }

    #[tokio::test]
    async fn test_sloppy_response_is_normalized() {
        let mock = MockGenerationBackend::new().with_response("  \"groceries\".\n");
        let outcome = classifier(&mock)
            .classify(&MerchantKey::from("COLES"), "")
            .await
            .unwrap();
        assert_eq!(outcome.category, "Groceries");
    }

    #[tokio::test]
    async fn test_invalid_response_falls_back() {
        let mock = MockGenerationBackend::new().with_response("Miscellaneous Stuff");
        let outcome = classifier(&mock)
            .classify(&MerchantKey::from("ACME"), "")
            .await
            .unwrap();
        assert_eq!(outcome.category, FALLBACK_CATEGORY);
        assert_eq!(outcome.raw_response.as_deref(), Some("Miscellaneous Stuff"));
        assert!(outcome.final_attempt_succeeded, "the call itself succeeded");
    }

    #[tokio::test]
    async fn test_transient_provider_error_degrades_to_fallback() {
        let mock = MockGenerationBackend::new().with_script(vec![Err(Error::Inference(
            "connection reset".to_string(),
        ))]);
        let outcome = classifier(&mock)
            .classify(&MerchantKey::from("ACME"), "")
            .await
            .unwrap();
        assert_eq!(outcome.category, FALLBACK_CATEGORY);
        assert_eq!(outcome.raw_response, None);
        assert!(!outcome.final_attempt_succeeded);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_single_call_still_propagates_rate_limit() {
        let mock = MockGenerationBackend::new()
            .with_script(vec![Err(Error::RateLimited { retry_after: None })]);
        let err = classifier(&mock)
            .classify(&MerchantKey::from("ACME"), "")
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_then_succeeds() {
        let mock = MockGenerationBackend::new()
            .with_script(vec![
                Err(Error::RateLimited { retry_after: None }),
                Err(Error::RateLimited { retry_after: None }),
                Ok("Transport".to_string()),
            ]);
        let outcome = classifier(&mock)
            .classify_with_retry(&MerchantKey::from("UBER"), "UBER *TRIP", 2)
            .await
            .unwrap();
        assert_eq!(outcome.category, "Transport");
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.retried());
        assert!(outcome.final_attempt_succeeded);
        assert_eq!(outcome.delays_ms, vec![1000, 2000]);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_429_records_one_base_delay() {
        // One 429, then success: two attempts with one base-length backoff.
        let mock = MockGenerationBackend::new().with_script(vec![
            Err(Error::RateLimited { retry_after: None }),
            Ok("Shopping".to_string()),
        ]);
        let outcome = classifier(&mock)
            .classify_with_retry(&MerchantKey::from("ACME"), "ACME UNKNOWN 42", 3)
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.delays_ms, vec![AI_BACKOFF_BASE_MS]);
        assert!(outcome.final_attempt_succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_retries() {
        let mock = MockGenerationBackend::new()
            .with_script(vec![
                Err(Error::RateLimited { retry_after: None }),
                Err(Error::RateLimited { retry_after: None }),
                Err(Error::RateLimited { retry_after: None }),
            ]);
        let err = classifier(&mock)
            .classify_with_retry(&MerchantKey::from("UBER"), "", 2)
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_is_not_retried() {
        let mock = MockGenerationBackend::new().with_script(vec![Err(Error::Inference(
            "connection reset".to_string(),
        ))]);
        let err = classifier(&mock)
            .classify_with_retry(&MerchantKey::from("BP"), "", 2)
            .await
            .unwrap_err();
        assert!(!err.is_rate_limited());
        assert_eq!(mock.call_count(), 1);
    }
}
