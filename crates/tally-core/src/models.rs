//! Core data models for the tally categorization engine.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A normalized, uppercase, de-suffixed merchant identifier.
///
/// Derived from a raw transaction description by
/// [`crate::normalizer::normalize_merchant`] and used as the join key across
/// heuristics, mappings, and jobs. Construction does not re-normalize; the
/// normalizer is the only intended producer outside tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantKey(pub String);

impl MerchantKey {
    /// View the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MerchantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MerchantKey {
    fn from(s: String) -> Self {
        MerchantKey(s)
    }
}

impl From<&str> for MerchantKey {
    fn from(s: &str) -> Self {
        MerchantKey(s.to_string())
    }
}

/// Provenance tag on a global mapping: how the category was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Set by the AI classifier (or a heuristic hit persisted on its behalf).
    Ai,
    /// Set by an explicit user vote.
    User,
    /// Set by a plurality tally over categorized history.
    Consensus,
}

/// Crowd-sourced mapping from a merchant key to a category.
///
/// One row per merchant key. Never deleted automatically; updated by every
/// vote and AI re-classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalMapping {
    pub merchant_key: MerchantKey,
    pub category: String,
    pub confidence: Confidence,
    pub vote_count: i64,
    /// Full per-category tally, populated by consensus rebuilds.
    pub category_votes: Option<HashMap<String, i64>>,
    /// Raw category the AI suggested, kept for auditability.
    pub ai_suggestion: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// Per-user category override for one merchant key.
///
/// Takes priority over [`GlobalMapping`] for that user. Created only by an
/// explicit user override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalMapping {
    pub user_id: Uuid,
    pub merchant_key: MerchantKey,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Status of a categorization job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A deferred classification work item, keyed by its unique expense.
///
/// Invariants: `attempts` only increases; `next_retry` is set only while
/// `status == Failed`. Transitions: pending -> processing -> completed or
/// failed; failed -> processing once `next_retry` elapses. A job never
/// reverts to pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationJob {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub merchant_key: MerchantKey,
    pub description: String,
    pub user_id: Option<Uuid>,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub next_retry: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fixed-window request counter for one external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitState {
    pub provider: String,
    pub request_count: i32,
    pub window_start: DateTime<Utc>,
    pub last_reset: DateTime<Utc>,
    pub last_request: Option<DateTime<Utc>>,
}

/// Caller-facing view of a provider's rate-limit budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub provider: String,
    pub available: bool,
    pub limit: i32,
    pub remaining: i32,
    /// When the current window rolls over and the budget resets.
    pub resets_at: DateTime<Utc>,
}

/// Which lookup resolved a category for a merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    Personal,
    Global,
    Heuristic,
    Ai,
    AiRetry,
}

impl ResolutionSource {
    /// Stable string form, used in logs and job results.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Personal => "personal",
            ResolutionSource::Global => "global",
            ResolutionSource::Heuristic => "heuristic",
            ResolutionSource::Ai => "ai",
            ResolutionSource::AiRetry => "ai-retry",
        }
    }
}

/// Outcome of resolving a category for one merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub category: String,
    pub source: ResolutionSource,
    /// Provider attempts consumed, when the AI path ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

/// Queue statistics summary, by status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// Failed jobs whose `next_retry` has already elapsed.
    pub retryable: i64,
    pub total: i64,
}

/// One historical categorized record, input to consensus rebuilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedRecord {
    pub merchant_key: MerchantKey,
    pub category: String,
}

/// An expense row as the pipeline sees it.
///
/// The surrounding tracker owns the rest of the expense schema (amounts,
/// import batches, display state); the pipeline only reads the merchant
/// fields and writes `category`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub merchant_name: String,
    pub description: String,
    pub user_id: Option<Uuid>,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merchant_key_display_and_as_str() {
        let key = MerchantKey::from("WOOLWORTHS");
        assert_eq!(key.as_str(), "WOOLWORTHS");
        assert_eq!(key.to_string(), "WOOLWORTHS");
    }

    #[test]
    fn test_merchant_key_serde_transparent() {
        let key = MerchantKey::from("BP");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"BP\"");
        let back: MerchantKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_confidence_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Confidence::Ai).unwrap(), "\"ai\"");
        assert_eq!(
            serde_json::to_string(&Confidence::Consensus).unwrap(),
            "\"consensus\""
        );
        let back: Confidence = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(back, Confidence::User);
    }

    #[test]
    fn test_job_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        let back: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, JobStatus::Failed);
    }

    #[test]
    fn test_resolution_source_as_str() {
        assert_eq!(ResolutionSource::Personal.as_str(), "personal");
        assert_eq!(ResolutionSource::Global.as_str(), "global");
        assert_eq!(ResolutionSource::Heuristic.as_str(), "heuristic");
        assert_eq!(ResolutionSource::Ai.as_str(), "ai");
        assert_eq!(ResolutionSource::AiRetry.as_str(), "ai-retry");
    }

    #[test]
    fn test_resolution_source_serde_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ResolutionSource::AiRetry).unwrap(),
            "\"ai-retry\""
        );
    }

    #[test]
    fn test_resolution_attempts_skipped_when_none() {
        let res = Resolution {
            category: "Groceries".to_string(),
            source: ResolutionSource::Global,
            attempts: None,
        };
        let json = serde_json::to_string(&res).unwrap();
        assert!(!json.contains("attempts"));
    }
}
