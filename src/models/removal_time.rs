//! # Removal Time Vocabulary
//!
//! Modes a request can select, the base-time strategy used by calculated mode,
//! and retention durations expressed in whole days.

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::constants::audit;

/// How the new removal time of a request is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "removal_time", rename_all = "snake_case")]
pub enum RemovalTimeMode {
    /// Derived per root from its time-to-live and the base-time strategy
    Calculated,
    /// Fixed timestamp supplied by the caller
    Absolute(DateTime<Utc>),
    /// Explicitly unset
    Cleared,
}

impl RemovalTimeMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Calculated => "calculated",
            Self::Absolute(_) => "absolute",
            Self::Cleared => "cleared",
        }
    }

    /// Value recorded in the audit log `mode` property
    pub fn audit_value(&self) -> &'static str {
        match self {
            Self::Calculated => audit::MODE_CALCULATED,
            Self::Absolute(_) => audit::MODE_ABSOLUTE,
            Self::Cleared => audit::MODE_CLEARED,
        }
    }

    /// Request-wide value, known up front for absolute and cleared mode only
    pub fn fixed_value(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Absolute(removal_time) => Some(*removal_time),
            Self::Calculated | Self::Cleared => None,
        }
    }
}

/// Which defining time of an entity a calculated removal time counts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseTimeStrategy {
    Start,
    #[default]
    End,
    None,
}

impl fmt::Display for BaseTimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for BaseTimeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "none" => Ok(Self::None),
            _ => Err(format!("Invalid removal time strategy: {s}")),
        }
    }
}

/// Retention duration in whole days.
///
/// Accepted spellings are an integer (`5`), a numeric string (`"5"`) and an
/// ISO-8601 day duration (`"P5D"`). Fractional days are rejected: removal times
/// move in whole-day increments only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeToLive(u32);

impl TimeToLive {
    pub fn days(days: u32) -> Self {
        Self(days)
    }

    pub fn as_days(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TimeToLive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}D", self.0)
    }
}

impl std::str::FromStr for TimeToLive {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('P')
            .and_then(|rest| rest.strip_suffix('D'))
            .unwrap_or(trimmed);

        if digits.contains('.') || digits.contains(',') {
            return Err(format!(
                "Invalid time to live '{s}': fractional days are not supported"
            ));
        }

        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| format!("Invalid time to live '{s}': expected whole days or P<n>D"))
    }
}

impl Serialize for TimeToLive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for TimeToLive {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeToLiveVisitor;

        impl Visitor<'_> for TimeToLiveVisitor {
            type Value = TimeToLive;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a whole number of days or an ISO-8601 day duration")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                u32::try_from(v)
                    .map(TimeToLive)
                    .map_err(|_| E::custom(format!("time to live {v} exceeds u32::MAX days")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                if v < 0 {
                    return Err(E::custom(format!("time to live must not be negative: {v}")));
                }
                self.visit_u64(v.unsigned_abs())
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                if v.fract() != 0.0 {
                    return Err(E::custom(format!(
                        "fractional days are not supported: {v}"
                    )));
                }
                if v < 0.0 || v > f64::from(u32::MAX) {
                    return Err(E::custom(format!("time to live out of range: {v}")));
                }
                Ok(TimeToLive(v as u32))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimeToLiveVisitor)
    }
}
