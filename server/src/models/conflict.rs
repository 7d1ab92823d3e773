use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::Event;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Detected,
    Resolved,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Detected => "detected",
            ConflictStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for ConflictStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(ConflictStatus::Detected),
            "resolved" => Ok(ConflictStatus::Resolved),
            other => Err(AppError::ValidationError(format!(
                "Unknown conflict status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two events competing for the same venue at the same time.
/// The pair is unordered: `(a, b)` and `(b, a)` are the same conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    pub event1_id: Uuid,
    pub event2_id: Uuid,
    pub description: String,
    pub status: ConflictStatus,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn detected(event: &Event, other: &Event, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event1_id: event.id,
            event2_id: other.id,
            description: format!(
                "Venue and time overlap detected between {} and {}",
                event.title, other.title
            ),
            status: ConflictStatus::Detected,
            detected_at: now,
            resolved_at: None,
        }
    }

    pub fn involves(&self, event_id: Uuid) -> bool {
        self.event1_id == event_id || self.event2_id == event_id
    }

    /// The member of the pair that is not `event_id`.
    pub fn other(&self, event_id: Uuid) -> Option<Uuid> {
        if self.event1_id == event_id {
            Some(self.event2_id)
        } else if self.event2_id == event_id {
            Some(self.event1_id)
        } else {
            None
        }
    }

    pub fn is_pair(&self, a: Uuid, b: Uuid) -> bool {
        (self.event1_id == a && self.event2_id == b) || (self.event1_id == b && self.event2_id == a)
    }

    pub fn is_detected(&self) -> bool {
        self.status == ConflictStatus::Detected
    }

    /// Resolution is one-way; calling this on a resolved entry keeps the
    /// original timestamp.
    pub fn resolve(&mut self, now: DateTime<Utc>) {
        if self.is_detected() {
            self.status = ConflictStatus::Resolved;
            self.resolved_at = Some(now);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictFilter {
    pub event_id: Option<Uuid>,
    pub status: Option<ConflictStatus>,
}

impl ConflictFilter {
    pub fn detected() -> Self {
        Self {
            event_id: None,
            status: Some(ConflictStatus::Detected),
        }
    }

    pub fn detected_for(event_id: Uuid) -> Self {
        Self {
            event_id: Some(event_id),
            status: Some(ConflictStatus::Detected),
        }
    }

    pub fn matches(&self, conflict: &Conflict) -> bool {
        self.event_id.map_or(true, |id| conflict.involves(id))
            && self.status.map_or(true, |s| conflict.status == s)
    }
}
