//! Repository and backend trait definitions.
//!
//! The db crate provides PostgreSQL implementations; the inference crate
//! provides generation backends. Orchestrator and worker code depends only
//! on these traits so tests can substitute in-memory or scripted fakes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CategorizationJob, CategorizedRecord, Confidence, Expense, GlobalMapping, MerchantKey,
    PersonalMapping, QueueStats, RateLimitStatus,
};

/// Durable key->category caches: global (crowd) and personal (per-user).
///
/// Absent mappings are a normal outcome, returned as `Ok(None)`.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// Point lookup of a user's override, the highest-priority source.
    async fn get_personal(
        &self,
        user_id: Uuid,
        key: &MerchantKey,
    ) -> Result<Option<PersonalMapping>>;

    /// Point lookup of the crowd mapping.
    async fn get_global(&self, key: &MerchantKey) -> Result<Option<GlobalMapping>>;

    /// Create or overwrite the crowd mapping (last-writer-wins).
    ///
    /// On create, `vote_count` starts at 0 for [`Confidence::Ai`] and 1
    /// otherwise. On overwrite the vote count is left untouched.
    async fn upsert_global(
        &self,
        key: &MerchantKey,
        category: &str,
        confidence: Confidence,
        ai_suggestion: Option<&str>,
    ) -> Result<()>;

    /// Create or overwrite a user's override (last-writer-wins).
    async fn upsert_personal(&self, user_id: Uuid, key: &MerchantKey, category: &str)
        -> Result<()>;

    /// Register a user vote on the crowd mapping.
    ///
    /// Creates the mapping with `vote_count = 1` and [`Confidence::User`]
    /// when absent; otherwise increments the count and sets the category to
    /// the newly voted value. This is most-recent-vote-wins, not majority
    /// vote; [`MappingRepository::rebuild_from_history`] is the true
    /// consensus operation.
    async fn vote(&self, key: &MerchantKey, category: &str) -> Result<GlobalMapping>;

    /// Rebuild crowd mappings from categorized history.
    ///
    /// Groups records by merchant key, tallies votes per category, and sets
    /// each mapping to the plurality choice with [`Confidence::Consensus`],
    /// storing the full tally. Returns the number of mappings written.
    async fn rebuild_from_history(&self, records: &[CategorizedRecord]) -> Result<u64>;
}

/// Durable record of deferred classification work.
#[async_trait]
pub trait CategorizationJobRepository: Send + Sync {
    /// Enqueue a job for an expense. Idempotent by `expense_id`: a duplicate
    /// call returns the existing job's id without inserting.
    async fn create(
        &self,
        expense_id: Uuid,
        merchant_key: &MerchantKey,
        description: &str,
        user_id: Option<Uuid>,
    ) -> Result<Uuid>;

    /// Fetch up to `max_jobs` jobs ready for processing: pending jobs
    /// oldest-first, then failed jobs whose `next_retry` has elapsed.
    async fn poll_ready(&self, max_jobs: i64) -> Result<Vec<CategorizationJob>>;

    /// Transition a job to `processing` and stamp `last_attempt`.
    async fn mark_processing(&self, job_id: Uuid) -> Result<()>;

    /// Transition a job to `completed`, counting the attempt.
    async fn mark_completed(&self, job_id: Uuid) -> Result<()>;

    /// Transition a job to `failed`, counting the attempt and scheduling
    /// `next_retry` from the backoff table.
    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Delete completed jobs older than the retention cutoff. Returns the
    /// number deleted.
    async fn cleanup_completed(&self, older_than_days: i64) -> Result<u64>;

    /// Counts by status, including failed jobs whose retry is already due.
    async fn stats(&self) -> Result<QueueStats>;

    /// Get a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<CategorizationJob>>;
}

/// Fixed-window request budget per external provider.
#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// Whether a request may be made right now. Rolls the window over when
    /// it has elapsed. Does not consume budget.
    async fn try_acquire(&self, provider: &str) -> Result<bool>;

    /// Record one request against the current window.
    async fn record_request(&self, provider: &str) -> Result<()>;

    /// Current budget view for UI/ops surfaces.
    async fn status(&self, provider: &str) -> Result<RateLimitStatus>;
}

/// The pipeline's view of expense rows: read merchant fields, write category.
#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Get an expense by id.
    async fn get(&self, expense_id: Uuid) -> Result<Option<Expense>>;

    /// Set the durable category on an expense.
    async fn set_category(&self, expense_id: Uuid, category: &str) -> Result<()>;

    /// List expenses with no category yet, oldest first.
    async fn list_uncategorized(&self, limit: i64) -> Result<Vec<Expense>>;

    /// Category -> count over all categorized expenses, for the weekly
    /// statistics job.
    async fn category_distribution(&self) -> Result<Vec<(String, i64)>>;
}

/// A text-generation backend (OpenAI-compatible endpoint, or a scripted
/// mock in tests).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
