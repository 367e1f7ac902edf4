//! # Job Execution
//!
//! Worker side of the batch engine: claims jobs from the shared queue, runs
//! them through the orchestration handlers and applies the retry budget.

pub mod worker_pool;

pub use worker_pool::{DrainReport, JobWorker, WorkerPool};
