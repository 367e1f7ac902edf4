#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Retention
//!
//! Bulk removal-time engine for workflow history.
//!
//! ## Overview
//!
//! Completed process executions, decision evaluations and batch operations leave
//! historic records behind, each carrying a removal time that history cleanup
//! deletes by. This crate recomputes and persists that removal time for whole
//! selections of roots, optionally cascading through the ownership hierarchy
//! (sub-processes, nested decisions and every dependent detail record).
//!
//! The work is split into persisted, retryable jobs:
//!
//! 1. A request creates a batch with one seed job.
//! 2. The seed job partitions the selected roots into execution jobs, grouped
//!    by deployment.
//! 3. Each execution job resolves its live hierarchy and writes removal times
//!    dependent-first and root-last, optionally in bounded chunks.
//! 4. The batch counts its jobs down and is archived exactly once.
//!
//! ## Module Organization
//!
//! - [`models`] - record kinds, removal time modes, batches, jobs and audit entries
//! - [`orchestration`] - request builder, strategy, resolver, planner and job handlers
//! - [`execution`] - job worker and worker pool with retry budget
//! - [`database`] - collaborator traits plus in-memory and PostgreSQL adapters
//! - [`config`] - layered configuration with validation
//! - [`events`] - lifecycle event publisher
//! - [`error`] - structured error handling
//! - [`logging`] - tracing subscriber setup and logging macros
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasker_retention::config::ConfigManager;
//! use tasker_retention::database::{InMemoryBatchStore, InMemoryHistoryStore};
//! use tasker_retention::events::EventPublisher;
//! use tasker_retention::execution::{JobWorker, WorkerPool};
//! use tasker_retention::models::{BatchType, HistoricQuery};
//! use tasker_retention::orchestration::{RemovalTimeService, SetRemovalTimeRequest};
//! use tasker_retention::utils::SystemClock;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! tasker_retention::logging::init_tracing();
//! let manager = ConfigManager::load()?;
//!
//! let history = InMemoryHistoryStore::new();
//! let clock = Arc::new(SystemClock);
//! let service = RemovalTimeService::new(
//!     history.clone(),
//!     Arc::new(history.writers()),
//!     InMemoryBatchStore::new(),
//!     manager.snapshot(),
//!     clock.clone(),
//!     EventPublisher::default(),
//! );
//!
//! let request = SetRemovalTimeRequest::builder(BatchType::ProcessSetRemovalTime)
//!     .by_query(HistoricQuery::new().finished())
//!     .calculated_removal_time()?
//!     .hierarchical()
//!     .build()?;
//! let batch = service.execute_async(&request).await?;
//!
//! let pool = WorkerPool::new(
//!     JobWorker::for_service(&service, clock),
//!     manager.config().worker.clone(),
//! );
//! pool.run_until_idle().await?;
//! println!("{:?}", service.batch_progress(batch.batch_id).await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod utils;

pub use config::{ConfigManager, RetentionConfig};
pub use error::{Result, RetentionError, ValidationError};
pub use orchestration::{RemovalTimeService, SetRemovalTimeRequest};
