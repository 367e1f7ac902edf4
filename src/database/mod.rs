//! # Database Layer
//!
//! Collaborator interfaces and their adapters.
//!
//! - [`history`] - read access to historic roots and hierarchy edges, plus one
//!   removal-time writer per record kind
//! - [`batch_store`] - batch rows, progress counters, the job queue and the
//!   completion archive
//! - [`memory_history`] / [`memory_batch`] - in-process adapters
//! - [`postgres`] - PostgreSQL batch store on sqlx
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tasker_retention::config::DatabaseConfig;
//! use tasker_retention::database::PgBatchStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgBatchStore::connect(&DatabaseConfig::default()).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod batch_store;
pub mod history;
pub mod memory_batch;
pub mod memory_history;
pub mod postgres;

pub use batch_store::{BatchRepository, BatchStore, JobQueue};
pub use history::{HistoryReader, RecordWriter, RemovalTimeWriters};
pub use memory_batch::InMemoryBatchStore;
pub use memory_history::{InMemoryHistoryStore, InMemoryRecordWriter, WriteRecord};
pub use postgres::PgBatchStore;
