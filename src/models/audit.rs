//! # Audit Log Entry
//!
//! One entry summarizes a set-removal-time operation with one property change per
//! recorded setting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::BatchType;
use super::removal_time::RemovalTimeMode;
use crate::constants::audit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    pub org_value: Option<String>,
    pub new_value: Option<String>,
}

impl PropertyChange {
    fn new(property: &str, new_value: Option<String>) -> Self {
        Self {
            property: property.to_string(),
            org_value: None,
            new_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub entry_id: Uuid,
    pub operation_type: String,
    pub category: String,
    pub entity_type: String,
    pub batch_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub properties: Vec<PropertyChange>,
}

impl AuditLogEntry {
    /// Summary entry for a set-removal-time operation
    pub fn set_removal_time(
        batch_type: BatchType,
        batch_id: Option<Uuid>,
        mode: &RemovalTimeMode,
        hierarchical: bool,
        instance_count: u32,
        is_async: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let removal_time = mode
            .fixed_value()
            .map(|value| value.timestamp_millis().to_string());

        Self {
            entry_id: Uuid::new_v4(),
            operation_type: audit::OPERATION_TYPE_SET_REMOVAL_TIME.to_string(),
            category: audit::CATEGORY_OPERATOR.to_string(),
            entity_type: batch_type.audit_entity_type().to_string(),
            batch_id,
            timestamp,
            properties: vec![
                PropertyChange::new(audit::PROPERTY_MODE, Some(mode.audit_value().to_string())),
                PropertyChange::new(audit::PROPERTY_REMOVAL_TIME, removal_time),
                PropertyChange::new(audit::PROPERTY_HIERARCHICAL, Some(hierarchical.to_string())),
                PropertyChange::new(
                    audit::PROPERTY_NR_OF_INSTANCES,
                    Some(instance_count.to_string()),
                ),
                PropertyChange::new(audit::PROPERTY_ASYNC, Some(is_async.to_string())),
            ],
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyChange> {
        self.properties.iter().find(|change| change.property == name)
    }
}
