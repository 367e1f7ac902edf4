//! # Root Selection
//!
//! What a request points at: an explicit id list, a query over historic roots,
//! or both. Both parts are resolved once, when the request is executed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hierarchy::{EntityId, HistoricRoot};

/// Filter over historic roots of one record kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricQuery {
    pub deployment_id: Option<String>,
    /// `Some(true)` matches ended roots only, `Some(false)` running ones only
    pub finished: Option<bool>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
}

impl HistoricQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deployment_id(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished = Some(true);
        self
    }

    pub fn unfinished(mut self) -> Self {
        self.finished = Some(false);
        self
    }

    pub fn started_after(mut self, at: DateTime<Utc>) -> Self {
        self.started_after = Some(at);
        self
    }

    pub fn started_before(mut self, at: DateTime<Utc>) -> Self {
        self.started_before = Some(at);
        self
    }

    pub fn matches(&self, root: &HistoricRoot) -> bool {
        if let Some(deployment_id) = &self.deployment_id {
            if root.deployment_id.as_ref() != Some(deployment_id) {
                return false;
            }
        }
        if let Some(finished) = self.finished {
            if root.end_time.is_some() != finished {
                return false;
            }
        }
        if let Some(after) = self.started_after {
            if root.start_time <= after {
                return false;
            }
        }
        if let Some(before) = self.started_before {
            if root.start_time >= before {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub query: Option<HistoricQuery>,
    pub ids: Option<Vec<EntityId>>,
}

impl Selection {
    pub fn is_specified(&self) -> bool {
        self.query.is_some() || self.ids.is_some()
    }
}
