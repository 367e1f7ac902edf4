//! # Orchestration Engine
//!
//! Core of the bulk set-removal-time engine. A request becomes a batch with one
//! seed job; the seed job plans execution jobs; execution jobs resolve the live
//! hierarchy and write removal times dependent-first and root-last; the progress
//! tracker counts jobs down and finalizes the batch exactly once.
//!
//! ## Core Components
//!
//! - **SetRemovalTimeRequest**: validated request built with a fluent builder
//! - **RemovalTimeService**: turns requests into batches, or runs them inline
//! - **RemovalTimeStrategy**: pure removal-time computation per root
//! - **HierarchyResolver**: closure walk from roots to every attached record
//! - **ChunkPlanner**: deployment-affine partition of roots into jobs
//! - **SeedJobHandler**: expands a batch into persisted execution jobs
//! - **ExecutionJobHandler**: one bounded, restartable write attempt
//! - **BatchProgressTracker**: atomic countdown and single-winner finalization

pub mod batch_progress_tracker;
pub mod chunk_planner;
pub mod execution_job_handler;
pub mod hierarchy_resolver;
pub mod removal_time_service;
pub mod removal_time_strategy;
pub mod request;
pub mod seed_job;

pub use batch_progress_tracker::BatchProgressTracker;
pub use chunk_planner::{ChunkPlanner, JobPlan};
pub use execution_job_handler::{ExecutionJobHandler, JobOutcome};
pub use hierarchy_resolver::{HierarchyResolver, RootTargets, TargetRole, TargetSet};
pub use removal_time_service::{RemovalTimeService, SyncReport};
pub use removal_time_strategy::RemovalTimeStrategy;
pub use request::{SetRemovalTimeRequest, SetRemovalTimeRequestBuilder};
pub use seed_job::SeedJobHandler;
