//! # System Constants
//!
//! Engine-wide limits, defaults and tag strings shared by the batch engine,
//! the persistence adapters and the audit log.

/// Upper bound for the number of rows a single chunked attempt may touch per window.
pub const MAX_CHUNK_SIZE: u32 = 500;

/// Chunk size used when neither configuration nor request override one.
pub const DEFAULT_CHUNK_SIZE: u32 = MAX_CHUNK_SIZE;

/// Root entities assigned to one execution job unless configured otherwise.
pub const DEFAULT_INVOCATIONS_PER_BATCH_JOB: u32 = 1;

/// Attempts a job gets before it is parked as an incident.
pub const DEFAULT_JOB_RETRIES: u32 = 3;

/// Drained but unfinalized batches picked up per idle sweep.
pub const DRAINED_BATCH_SWEEP_LIMIT: usize = 100;

/// Batch type tags, one per removal-time variant.
pub mod batch_types {
    pub const PROCESS_SET_REMOVAL_TIME: &str = "process-set-removal-time";
    pub const DECISION_SET_REMOVAL_TIME: &str = "decision-set-removal-time";
    pub const BATCH_SET_REMOVAL_TIME: &str = "batch-set-removal-time";

    pub const ALL: [&str; 3] = [
        PROCESS_SET_REMOVAL_TIME,
        DECISION_SET_REMOVAL_TIME,
        BATCH_SET_REMOVAL_TIME,
    ];
}

/// Audit log vocabulary
pub mod audit {
    pub const OPERATION_TYPE_SET_REMOVAL_TIME: &str = "SetRemovalTime";
    pub const CATEGORY_OPERATOR: &str = "Operator";

    pub const PROPERTY_MODE: &str = "mode";
    pub const PROPERTY_REMOVAL_TIME: &str = "removalTime";
    pub const PROPERTY_HIERARCHICAL: &str = "hierarchical";
    pub const PROPERTY_NR_OF_INSTANCES: &str = "nrOfInstances";
    pub const PROPERTY_ASYNC: &str = "async";

    pub const MODE_CALCULATED: &str = "CALCULATED_REMOVAL_TIME";
    pub const MODE_ABSOLUTE: &str = "ABSOLUTE_REMOVAL_TIME";
    pub const MODE_CLEARED: &str = "CLEARED_REMOVAL_TIME";
}

/// Lifecycle event names published by the batch engine
pub mod events {
    pub const BATCH_CREATED: &str = "batch.created";
    pub const BATCH_SEEDED: &str = "batch.seeded";
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_RESCHEDULED: &str = "job.rescheduled";
    pub const JOB_FAILED: &str = "job.failed";
}
