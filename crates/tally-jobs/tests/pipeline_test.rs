//! End-to-end pipeline tests over in-memory repositories.
//!
//! Exercises the full flow: an expense lands, gets enqueued, the worker
//! classifies it, and user corrections feed back into the crowd mappings.

use std::sync::Arc;

use tally_core::{
    CategorizationJobRepository, CategorizedRecord, Confidence, JobStatus, MappingRepository,
    MerchantKey, ResolutionSource,
};
use tally_inference::{MerchantClassifier, MockGenerationBackend};
use tally_jobs::testing::{
    InMemoryExpenseRepository, InMemoryJobRepository, InMemoryMappingRepository,
    InMemoryRateLimiter,
};
use tally_jobs::{CategorizationOrchestrator, CategorizationWorker, WorkerConfig};

struct Pipeline {
    mappings: InMemoryMappingRepository,
    jobs: InMemoryJobRepository,
    expenses: InMemoryExpenseRepository,
    orchestrator: CategorizationOrchestrator,
    worker: CategorizationWorker,
}

fn pipeline(mock: MockGenerationBackend) -> Pipeline {
    let mappings = InMemoryMappingRepository::new();
    let jobs = InMemoryJobRepository::new();
    let limiter = InMemoryRateLimiter::new();
    let expenses = InMemoryExpenseRepository::new();
    let classifier = Arc::new(MerchantClassifier::new(Arc::new(mock)));

    let orchestrator = CategorizationOrchestrator::new(
        Arc::new(mappings.clone()),
        Arc::new(jobs.clone()),
        Arc::new(limiter.clone()),
        Arc::new(expenses.clone()),
        classifier.clone(),
    );
    let worker = CategorizationWorker::new(
        Arc::new(mappings.clone()),
        Arc::new(jobs.clone()),
        Arc::new(limiter),
        Arc::new(expenses.clone()),
        classifier,
        WorkerConfig::default(),
    );
    Pipeline {
        mappings,
        jobs,
        expenses,
        orchestrator,
        worker,
    }
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_then_worker_categorizes() {
    let p = pipeline(MockGenerationBackend::new().with_response("Shopping"));

    let expense_id = p.expenses.insert("ZVQRT ONLINE", "no keywords here", None);
    let job_id = p.orchestrator.enqueue_expense(expense_id).await.unwrap();

    let ready = p.jobs.poll_ready(10).await.unwrap();
    assert_eq!(ready.len(), 1);
    let disposition = p.worker.process_job(&ready[0]).await.unwrap();
    assert!(matches!(
        disposition,
        tally_jobs::JobDisposition::Completed { .. }
    ));

    assert_eq!(p.expenses.category_of(expense_id).as_deref(), Some("Shopping"));
    let job = p.jobs.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // The crowd mapping now short-circuits future resolutions.
    let resolution = p
        .orchestrator
        .resolve(None, "ZVQRT ONLINE", "no keywords here", false)
        .await
        .unwrap();
    assert_eq!(resolution.source, ResolutionSource::Global);
    assert_eq!(resolution.category, "Shopping");
}

#[tokio::test]
async fn test_override_then_consensus_rebuild() {
    let p = pipeline(MockGenerationBackend::new());
    let key = MerchantKey::from("WOOLWORTHS");

    // Start from an AI-sourced mapping with a wrong category.
    p.mappings
        .upsert_global(&key, "Shopping", Confidence::Ai, Some("Shopping"))
        .await
        .unwrap();

    let expense_id = p
        .expenses
        .insert("WOOLWORTHS TOWN HALL 123", "WOOLWORTHS TOWN HALL 123", None);
    p.orchestrator
        .apply_user_override(expense_id, "Groceries", true)
        .await
        .unwrap();

    let mapping = p.mappings.get_global(&key).await.unwrap().unwrap();
    assert_eq!(mapping.category, "Groceries");
    assert_eq!(mapping.confidence, Confidence::User);

    // Consensus rebuild from history confirms the plurality choice.
    let records = vec![
        CategorizedRecord {
            merchant_key: key.clone(),
            category: "Groceries".to_string(),
        },
        CategorizedRecord {
            merchant_key: key.clone(),
            category: "Groceries".to_string(),
        },
        CategorizedRecord {
            merchant_key: key.clone(),
            category: "Shopping".to_string(),
        },
    ];
    let written = p.orchestrator.rebuild_consensus(&records).await.unwrap();
    assert_eq!(written, 1);

    let rebuilt = p.mappings.get_global(&key).await.unwrap().unwrap();
    assert_eq!(rebuilt.category, "Groceries");
    assert_eq!(rebuilt.confidence, Confidence::Consensus);
    assert_eq!(rebuilt.vote_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_job_retries_later_and_succeeds() {
    // Provider is persistently rate limited at first, then recovers.
    let p = pipeline(MockGenerationBackend::new().with_script(vec![
        Err(tally_core::Error::RateLimited { retry_after: None }),
        Err(tally_core::Error::RateLimited { retry_after: None }),
        Err(tally_core::Error::RateLimited { retry_after: None }),
        Ok("Travel".to_string()),
    ]));

    let expense_id = p.expenses.insert("ZVQRT AIR", "no keywords here", None);
    let job_id = p.orchestrator.enqueue_expense(expense_id).await.unwrap();

    // First attempt burns the in-call retry budget and reschedules.
    let ready = p.jobs.poll_ready(10).await.unwrap();
    let disposition = p.worker.process_job(&ready[0]).await.unwrap();
    assert!(matches!(
        disposition,
        tally_jobs::JobDisposition::Failed { .. }
    ));
    let job = p.jobs.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.next_retry.is_some(), "failed job schedules a retry");

    // Once the retry is due, the next attempt succeeds.
    p.jobs.force_retry_due(job_id);
    let ready = p.jobs.poll_ready(10).await.unwrap();
    assert_eq!(ready.len(), 1, "due retry must be polled");
    let disposition = p.worker.process_job(&ready[0]).await.unwrap();
    assert!(matches!(
        disposition,
        tally_jobs::JobDisposition::Completed { .. }
    ));
    assert_eq!(p.expenses.category_of(expense_id).as_deref(), Some("Travel"));
}
