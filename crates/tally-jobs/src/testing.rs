//! In-memory repository implementations for deterministic testing.
//!
//! These back the orchestrator, worker, and scheduler tests without a live
//! database. Always compiled so integration tests in `tests/` can use them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use tally_core::defaults::{
    job_backoff_minutes, RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW_SECS,
};
use tally_core::{
    CategorizationJob, CategorizationJobRepository, CategorizedRecord, Confidence, Error, Expense,
    ExpenseRepository, GlobalMapping, JobStatus, MappingRepository, MerchantKey, PersonalMapping,
    QueueStats, RateLimitRepository, RateLimitStatus, Result,
};

/// In-memory MappingRepository.
#[derive(Clone, Default)]
pub struct InMemoryMappingRepository {
    global: Arc<Mutex<HashMap<String, GlobalMapping>>>,
    personal: Arc<Mutex<HashMap<(Uuid, String), PersonalMapping>>>,
}

impl InMemoryMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of global mappings currently stored.
    pub fn global_len(&self) -> usize {
        self.global.lock().unwrap().len()
    }
}

#[async_trait]
impl MappingRepository for InMemoryMappingRepository {
    async fn get_personal(
        &self,
        user_id: Uuid,
        key: &MerchantKey,
    ) -> Result<Option<PersonalMapping>> {
        Ok(self
            .personal
            .lock()
            .unwrap()
            .get(&(user_id, key.as_str().to_string()))
            .cloned())
    }

    async fn get_global(&self, key: &MerchantKey) -> Result<Option<GlobalMapping>> {
        Ok(self.global.lock().unwrap().get(key.as_str()).cloned())
    }

    async fn upsert_global(
        &self,
        key: &MerchantKey,
        category: &str,
        confidence: Confidence,
        ai_suggestion: Option<&str>,
    ) -> Result<()> {
        let mut global = self.global.lock().unwrap();
        let entry = global
            .entry(key.as_str().to_string())
            .or_insert_with(|| GlobalMapping {
                merchant_key: key.clone(),
                category: category.to_string(),
                confidence,
                vote_count: match confidence {
                    Confidence::Ai => 0,
                    _ => 1,
                },
                category_votes: None,
                ai_suggestion: ai_suggestion.map(String::from),
                last_updated: Utc::now(),
            });
        entry.category = category.to_string();
        entry.confidence = confidence;
        entry.ai_suggestion = ai_suggestion.map(String::from);
        entry.last_updated = Utc::now();
        Ok(())
    }

    async fn upsert_personal(
        &self,
        user_id: Uuid,
        key: &MerchantKey,
        category: &str,
    ) -> Result<()> {
        self.personal.lock().unwrap().insert(
            (user_id, key.as_str().to_string()),
            PersonalMapping {
                user_id,
                merchant_key: key.clone(),
                category: category.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn vote(&self, key: &MerchantKey, category: &str) -> Result<GlobalMapping> {
        let mut global = self.global.lock().unwrap();
        let entry = global
            .entry(key.as_str().to_string())
            .or_insert_with(|| GlobalMapping {
                merchant_key: key.clone(),
                category: category.to_string(),
                confidence: Confidence::User,
                vote_count: 0,
                category_votes: None,
                ai_suggestion: None,
                last_updated: Utc::now(),
            });
        entry.category = category.to_string();
        entry.confidence = Confidence::User;
        entry.vote_count += 1;
        entry.last_updated = Utc::now();
        Ok(entry.clone())
    }

    async fn rebuild_from_history(&self, records: &[CategorizedRecord]) -> Result<u64> {
        let mut tallies: HashMap<&str, HashMap<&str, i64>> = HashMap::new();
        for record in records {
            *tallies
                .entry(record.merchant_key.as_str())
                .or_default()
                .entry(record.category.as_str())
                .or_insert(0) += 1;
        }

        let mut global = self.global.lock().unwrap();
        let mut written = 0u64;
        for (key, votes) in &tallies {
            let Some((winner, _)) = votes
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            else {
                continue;
            };
            let total: i64 = votes.values().sum();
            global.insert(
                key.to_string(),
                GlobalMapping {
                    merchant_key: MerchantKey::from(*key),
                    category: winner.to_string(),
                    confidence: Confidence::Consensus,
                    vote_count: total,
                    category_votes: Some(
                        votes
                            .iter()
                            .map(|(c, n)| (c.to_string(), *n))
                            .collect(),
                    ),
                    ai_suggestion: None,
                    last_updated: Utc::now(),
                },
            );
            written += 1;
        }
        Ok(written)
    }
}

/// In-memory CategorizationJobRepository.
#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<Mutex<HashMap<Uuid, CategorizationJob>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a failed job's retry into the past so a poll picks it up now.
    pub fn force_retry_due(&self, job_id: Uuid) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&job_id) {
            job.next_retry = Some(Utc::now() - Duration::seconds(1));
        }
    }
}

#[async_trait]
impl CategorizationJobRepository for InMemoryJobRepository {
    async fn create(
        &self,
        expense_id: Uuid,
        merchant_key: &MerchantKey,
        description: &str,
        user_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs.values().find(|j| j.expense_id == expense_id) {
            return Ok(existing.id);
        }
        let id = Uuid::new_v4();
        jobs.insert(
            id,
            CategorizationJob {
                id,
                expense_id,
                merchant_key: merchant_key.clone(),
                description: description.to_string(),
                user_id,
                status: JobStatus::Pending,
                attempts: 0,
                last_attempt: None,
                next_retry: None,
                error_message: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn poll_ready(&self, max_jobs: i64) -> Result<Vec<CategorizationJob>> {
        let now = Utc::now();
        let jobs = self.jobs.lock().unwrap();

        let mut pending: Vec<CategorizationJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(max_jobs as usize);

        let remaining = max_jobs as usize - pending.len();
        if remaining > 0 {
            let mut retries: Vec<CategorizationJob> = jobs
                .values()
                .filter(|j| {
                    j.status == JobStatus::Failed
                        && j.next_retry.map(|at| at <= now).unwrap_or(false)
                })
                .cloned()
                .collect();
            retries.sort_by_key(|j| j.next_retry);
            retries.truncate(remaining);
            pending.extend(retries);
        }
        Ok(pending)
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        job.status = JobStatus::Processing;
        job.last_attempt = Some(Utc::now());
        Ok(())
    }

    async fn mark_completed(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        job.status = JobStatus::Completed;
        job.attempts += 1;
        job.next_retry = None;
        job.error_message = None;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        job.status = JobStatus::Failed;
        job.attempts += 1;
        job.last_attempt = Some(Utc::now());
        job.next_retry = Some(Utc::now() + Duration::minutes(job_backoff_minutes(job.attempts)));
        job.error_message = Some(error.to_string());
        Ok(())
    }

    async fn cleanup_completed(&self, older_than_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, j| !(j.status == JobStatus::Completed && j.created_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let now = Utc::now();
        let jobs = self.jobs.lock().unwrap();
        let count = |status: JobStatus| jobs.values().filter(|j| j.status == status).count() as i64;
        Ok(QueueStats {
            pending: count(JobStatus::Pending),
            processing: count(JobStatus::Processing),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
            retryable: jobs
                .values()
                .filter(|j| {
                    j.status == JobStatus::Failed
                        && j.next_retry.map(|at| at <= now).unwrap_or(false)
                })
                .count() as i64,
            total: jobs.len() as i64,
        })
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<CategorizationJob>> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }
}

/// In-memory RateLimitRepository with a fixed budget and no window rollover.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    count: Arc<Mutex<i32>>,
    limit: i32,
    window_start: DateTime<Utc>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::with_limit(RATE_LIMIT_MAX_REQUESTS)
    }

    pub fn with_limit(limit: i32) -> Self {
        Self {
            count: Arc::new(Mutex::new(0)),
            limit,
            window_start: Utc::now(),
        }
    }

    /// Requests recorded so far.
    pub fn recorded(&self) -> i32 {
        *self.count.lock().unwrap()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitRepository for InMemoryRateLimiter {
    async fn try_acquire(&self, _provider: &str) -> Result<bool> {
        Ok(*self.count.lock().unwrap() < self.limit)
    }

    async fn record_request(&self, _provider: &str) -> Result<()> {
        *self.count.lock().unwrap() += 1;
        Ok(())
    }

    async fn status(&self, provider: &str) -> Result<RateLimitStatus> {
        let count = *self.count.lock().unwrap();
        Ok(RateLimitStatus {
            provider: provider.to_string(),
            available: count < self.limit,
            limit: self.limit,
            remaining: (self.limit - count).max(0),
            resets_at: self.window_start + Duration::seconds(RATE_LIMIT_WINDOW_SECS),
        })
    }
}

/// In-memory ExpenseRepository.
#[derive(Clone, Default)]
pub struct InMemoryExpenseRepository {
    rows: Arc<Mutex<HashMap<Uuid, Expense>>>,
}

impl InMemoryExpenseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an expense row, returning its id.
    pub fn insert(&self, merchant_name: &str, description: &str, user_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.rows.lock().unwrap().insert(
            id,
            Expense {
                id,
                merchant_name: merchant_name.to_string(),
                description: description.to_string(),
                user_id,
                category: None,
                occurred_at: Utc::now(),
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Read back the stored category for assertions.
    pub fn category_of(&self, expense_id: Uuid) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .get(&expense_id)
            .and_then(|e| e.category.clone())
    }
}

#[async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn get(&self, expense_id: Uuid) -> Result<Option<Expense>> {
        Ok(self.rows.lock().unwrap().get(&expense_id).cloned())
    }

    async fn set_category(&self, expense_id: Uuid, category: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&expense_id)
            .ok_or(Error::ExpenseNotFound(expense_id))?;
        row.category = Some(category.to_string());
        Ok(())
    }

    async fn list_uncategorized(&self, limit: i64) -> Result<Vec<Expense>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<Expense> = rows
            .values()
            .filter(|e| e.category.is_none())
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn category_distribution(&self) -> Result<Vec<(String, i64)>> {
        let rows = self.rows.lock().unwrap();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for expense in rows.values() {
            if let Some(category) = &expense.category {
                *counts.entry(category.clone()).or_insert(0) += 1;
            }
        }
        let mut out: Vec<(String, i64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }
}
