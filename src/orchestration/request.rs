//! # Set Removal Time Request
//!
//! Builder for bulk set-removal-time requests. Configuration mistakes fail on
//! the call that makes them or at [`SetRemovalTimeRequestBuilder::build`];
//! a built request is always structurally valid.
//!
//! ```rust
//! use tasker_retention::models::{BatchType, HistoricQuery};
//! use tasker_retention::orchestration::SetRemovalTimeRequest;
//!
//! # fn main() -> Result<(), tasker_retention::error::ValidationError> {
//! let request = SetRemovalTimeRequest::builder(BatchType::ProcessSetRemovalTime)
//!     .by_query(HistoricQuery::new().finished())
//!     .calculated_removal_time()?
//!     .hierarchical()
//!     .build()?;
//! assert!(request.hierarchical);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::{BatchType, ChunkSize, EntityId, HistoricQuery, RemovalTimeMode, Selection};

/// Validated request accepted by the removal time service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRemovalTimeRequest {
    pub batch_type: BatchType,
    pub selection: Selection,
    pub mode: RemovalTimeMode,
    pub hierarchical: bool,
    pub update_in_chunks: bool,
    /// Override of the configured chunk size; only read for chunked updates
    pub chunk_size: Option<ChunkSize>,
}

impl SetRemovalTimeRequest {
    pub fn builder(batch_type: BatchType) -> SetRemovalTimeRequestBuilder {
        SetRemovalTimeRequestBuilder::new(batch_type)
    }

    pub fn is_chunked(&self) -> bool {
        self.update_in_chunks
    }
}

#[derive(Debug, Clone)]
pub struct SetRemovalTimeRequestBuilder {
    batch_type: BatchType,
    query: Option<HistoricQuery>,
    ids: Option<Vec<EntityId>>,
    mode: Option<RemovalTimeMode>,
    hierarchical: bool,
    update_in_chunks: bool,
    chunk_size: Option<ChunkSize>,
}

impl SetRemovalTimeRequestBuilder {
    pub fn new(batch_type: BatchType) -> Self {
        Self {
            batch_type,
            query: None,
            ids: None,
            mode: None,
            hierarchical: false,
            update_in_chunks: false,
            chunk_size: None,
        }
    }

    pub fn by_query(mut self, query: HistoricQuery) -> Self {
        self.query = Some(query);
        self
    }

    /// Explicit roots; combined with a query, the union is selected
    pub fn by_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        self.ids
            .get_or_insert_with(Vec::new)
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn calculated_removal_time(self) -> Result<Self, ValidationError> {
        self.with_mode(RemovalTimeMode::Calculated)
    }

    pub fn absolute_removal_time(self, removal_time: DateTime<Utc>) -> Result<Self, ValidationError> {
        self.with_mode(RemovalTimeMode::Absolute(removal_time))
    }

    pub fn clear_removal_time(self) -> Result<Self, ValidationError> {
        self.with_mode(RemovalTimeMode::Cleared)
    }

    pub fn hierarchical(mut self) -> Self {
        self.hierarchical = true;
        self
    }

    /// Bound the rows one job attempt writes
    pub fn update_in_chunks(mut self) -> Self {
        self.update_in_chunks = true;
        self
    }

    /// Per-request chunk size override; implies [`Self::update_in_chunks`]
    pub fn chunk_size(mut self, chunk_size: i64) -> Result<Self, ValidationError> {
        self.chunk_size = Some(ChunkSize::new(chunk_size)?);
        self.update_in_chunks = true;
        Ok(self)
    }

    pub fn build(self) -> Result<SetRemovalTimeRequest, ValidationError> {
        if self.query.is_none() && self.ids.is_none() {
            return Err(ValidationError::NoSelection);
        }
        let mode = self.mode.ok_or(ValidationError::NoRemovalTimeMode)?;

        Ok(SetRemovalTimeRequest {
            batch_type: self.batch_type,
            selection: Selection {
                query: self.query,
                ids: self.ids,
            },
            mode,
            hierarchical: self.hierarchical,
            update_in_chunks: self.update_in_chunks,
            chunk_size: self.chunk_size,
        })
    }

    fn with_mode(mut self, mode: RemovalTimeMode) -> Result<Self, ValidationError> {
        if let Some(existing) = self.mode {
            return Err(ValidationError::ModesMutuallyExclusive {
                existing: existing.name(),
                requested: mode.name(),
            });
        }
        self.mode = Some(mode);
        Ok(self)
    }
}
