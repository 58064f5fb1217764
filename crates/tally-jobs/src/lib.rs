//! # tally-jobs
//!
//! Categorization orchestration and background processing for tally.
//!
//! This crate provides:
//! - [`CategorizationOrchestrator`], the synchronous resolution path
//!   (personal mapping, crowd mapping, heuristics, then the AI provider)
//! - [`CategorizationWorker`], a rate-limit-aware queue drainer with
//!   broadcast events and graceful shutdown
//! - [`MaintenanceScheduler`], daily sweep/cleanup and weekly statistics
//! - In-memory repository fakes for testing
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally_db::Database;
//! use tally_inference::{MerchantClassifier, OpenAIBackend};
//! use tally_jobs::{CategorizationWorker, WorkerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let classifier = Arc::new(MerchantClassifier::new(Arc::new(OpenAIBackend::from_env()?)));
//!
//! let worker = CategorizationWorker::from_database(&db, classifier, WorkerConfig::from_env());
//! let handle = worker.start();
//!
//! // Listen for events
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod orchestrator;
pub mod scheduler;
pub mod testing;
pub mod worker;

// Re-export core types
pub use tally_core::*;

pub use orchestrator::{BulkCategorizationOutcome, CategorizationOrchestrator};
pub use scheduler::{DailyPassSummary, MaintenanceScheduler, SchedulerHandle, WeeklySnapshot};
pub use worker::{
    CategorizationWorker, JobDisposition, WorkerConfig, WorkerEvent, WorkerHandle,
};
