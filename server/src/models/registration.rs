use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::Event;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Waiting for payment confirmation.
    Pending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, RegistrationStatus::Cancelled)
    }
}

impl FromStr for RegistrationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(AppError::ValidationError(format!(
                "Unknown registration status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub student_id: Uuid,
    pub status: RegistrationStatus,
    pub attended: bool,
    pub feedback_given: bool,
    pub registered_at: DateTime<Utc>,
    pub attendance_marked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// Free events confirm on the spot; paid ones wait for the payment step.
    pub fn for_event(event: &Event, student_id: Uuid, now: DateTime<Utc>) -> Self {
        let status = if event.is_paid {
            RegistrationStatus::Pending
        } else {
            RegistrationStatus::Confirmed
        };
        Self {
            id: Uuid::new_v4(),
            event_id: event.id,
            student_id,
            status,
            attended: false,
            feedback_given: false,
            registered_at: now,
            attendance_marked_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationFilter {
    pub event_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<RegistrationStatus>,
}

impl RegistrationFilter {
    pub fn for_event(event_id: Uuid) -> Self {
        Self {
            event_id: Some(event_id),
            ..Self::default()
        }
    }

    pub fn for_student(student_id: Uuid) -> Self {
        Self {
            student_id: Some(student_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, registration: &Registration) -> bool {
        self.event_id.map_or(true, |id| registration.event_id == id)
            && self.student_id.map_or(true, |id| registration.student_id == id)
            && self.status.map_or(true, |s| registration.status == s)
    }
}

/// Body of an attendance request: the code displayed at the venue.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceCode {
    pub code: String,
}

/// A student's own view of an event they registered for.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredEvent {
    #[serde(flatten)]
    pub event: Event,
    pub registration_status: RegistrationStatus,
    pub attended: bool,
    pub feedback_given: bool,
}
