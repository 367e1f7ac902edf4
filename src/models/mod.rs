//! # Models
//!
//! Data shapes shared by the orchestration core and the persistence adapters.
//!
//! - [`record_kind`] - historic tables carrying a removal time, in write order
//! - [`removal_time`] - modes, base-time strategy and time-to-live
//! - [`hierarchy`] - entity references, hierarchy edges and root metadata
//! - [`batch`] - batch rows, progress counters and the historic archive row
//! - [`job`] - seed and execution jobs and their queue row
//! - [`audit`] - audit log entries
//! - [`selection`] - explicit ids and historic queries naming the roots

pub mod audit;
pub mod batch;
pub mod hierarchy;
pub mod job;
pub mod record_kind;
pub mod removal_time;
pub mod selection;

pub use audit::{AuditLogEntry, PropertyChange};
pub use batch::{Batch, BatchOperation, BatchProgress, BatchType, HistoricBatch};
pub use hierarchy::{EdgeKind, EntityId, EntityRef, HierarchyEdge, HistoricRoot};
pub use job::{
    ChunkCursor, ChunkSize, ExecutionJob, ExecutionJobConfiguration, JobPayload, JobState,
    QueuedJob, SeedJobConfiguration,
};
pub use record_kind::RecordKind;
pub use removal_time::{BaseTimeStrategy, RemovalTimeMode, TimeToLive};
pub use selection::{HistoricQuery, Selection};
