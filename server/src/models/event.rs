use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

/// Audience breadth of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Class,
    Department,
    Organization,
    College,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Class => "class",
            EventLevel::Department => "department",
            EventLevel::Organization => "organization",
            EventLevel::College => "college",
        }
    }
}

impl FromStr for EventLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "class" => Ok(EventLevel::Class),
            "department" => Ok(EventLevel::Department),
            "organization" => Ok(EventLevel::Organization),
            "college" => Ok(EventLevel::College),
            other => Err(AppError::ValidationError(format!(
                "Unknown event level '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Rejected => "rejected",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
        }
    }

    /// Rejected and cancelled events never compete for a venue.
    pub fn competes_for_venue(&self) -> bool {
        !matches!(self, EventStatus::Rejected | EventStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Rejected | EventStatus::Cancelled | EventStatus::Completed
        )
    }
}

impl FromStr for EventStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(EventStatus::Pending),
            "approved" => Ok(EventStatus::Approved),
            "rejected" => Ok(EventStatus::Rejected),
            "cancelled" => Ok(EventStatus::Cancelled),
            "completed" => Ok(EventStatus::Completed),
            other => Err(AppError::ValidationError(format!(
                "Unknown event status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub level: EventLevel,
    pub category: Option<String>,
    pub venue: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub registration_deadline: DateTime<Utc>,
    pub max_participants: Option<i32>,
    pub is_paid: bool,
    pub registration_fee: Option<Decimal>,
    pub status: EventStatus,
    pub status_comments: Option<String>,
    pub approved_by: Option<Uuid>,
    pub class_name: Option<String>,
    pub year: Option<i16>,
    pub semester: Option<i16>,
    pub completion_notified: bool,
    /// Shown at the venue for students to mark attendance. Never serialized
    /// with the event; see [`EventView`].
    #[serde(skip_serializing, default)]
    pub attendance_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event as read through the API, with registration figures.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    /// Only for the organizer and admins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_code: Option<String>,
    pub registered_count: i64,
    /// None when the event has no participant limit.
    pub available_slots: Option<i64>,
    pub is_registration_open: bool,
}

/// Payload an organizer submits to create an event.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub level: EventLevel,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    pub venue: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub registration_deadline: DateTime<Utc>,
    pub max_participants: Option<i32>,
    #[serde(default)]
    pub is_paid: bool,
    pub registration_fee: Option<Decimal>,
    pub class_name: Option<String>,
    pub year: Option<i16>,
    pub semester: Option<i16>,
}

/// Partial edit by the organizer. Status is never editable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub level: Option<EventLevel>,
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub venue: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub max_participants: Option<i32>,
    pub is_paid: Option<bool>,
    pub registration_fee: Option<Decimal>,
    pub class_name: Option<String>,
    pub year: Option<i16>,
    pub semester: Option<i16>,
}

impl EventUpdate {
    pub fn touches_schedule(&self) -> bool {
        self.venue.is_some() || self.start_date.is_some() || self.end_date.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub level: Option<EventLevel>,
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub status: Option<EventStatus>,
    #[serde(skip)]
    pub organizer_id: Option<Uuid>,
    #[serde(skip)]
    pub venue: Option<String>,
}

impl EventFilter {
    pub fn with_status(status: EventStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn at_venue(venue: impl Into<String>) -> Self {
        Self {
            venue: Some(venue.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.level.map_or(true, |level| event.level == level)
            && self
                .category
                .as_deref()
                .map_or(true, |c| event.category.as_deref() == Some(c))
            && self.status.map_or(true, |status| event.status == status)
            && self
                .organizer_id
                .map_or(true, |id| event.organizer_id == id)
            && self.venue.as_deref().map_or(true, |v| event.venue == v)
    }
}

impl Event {
    pub fn from_new(new: NewEvent, organizer_id: Uuid, now: DateTime<Utc>) -> Result<Self, AppError> {
        let event = Self {
            id: Uuid::new_v4(),
            organizer_id,
            title: new.title.trim().to_string(),
            description: new.description,
            level: new.level,
            category: new.category,
            venue: new.venue,
            start_date: new.start_date,
            end_date: new.end_date,
            registration_deadline: new.registration_deadline,
            max_participants: new.max_participants,
            is_paid: new.is_paid,
            registration_fee: new.registration_fee,
            status: EventStatus::Pending,
            status_comments: None,
            approved_by: None,
            class_name: new.class_name,
            year: new.year,
            semester: new.semester,
            completion_notified: false,
            attendance_code: Uuid::new_v4().simple().to_string(),
            created_at: now,
            updated_at: now,
        };
        event.validate()?;
        Ok(event)
    }

    /// Applies an organizer edit, then re-validates the whole record.
    pub fn apply_update(&mut self, update: EventUpdate, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut next = self.clone();
        if let Some(title) = update.title {
            next.title = title.trim().to_string();
        }
        if update.description.is_some() {
            next.description = update.description;
        }
        if let Some(level) = update.level {
            next.level = level;
        }
        if update.category.is_some() {
            next.category = update.category;
        }
        if let Some(venue) = update.venue {
            next.venue = venue;
        }
        if let Some(start) = update.start_date {
            next.start_date = start;
        }
        if let Some(end) = update.end_date {
            next.end_date = end;
        }
        if let Some(deadline) = update.registration_deadline {
            next.registration_deadline = deadline;
        }
        if update.max_participants.is_some() {
            next.max_participants = update.max_participants;
        }
        if let Some(is_paid) = update.is_paid {
            next.is_paid = is_paid;
        }
        if update.registration_fee.is_some() {
            next.registration_fee = update.registration_fee;
        }
        if update.class_name.is_some() {
            next.class_name = update.class_name;
        }
        if update.year.is_some() {
            next.year = update.year;
        }
        if update.semester.is_some() {
            next.semester = update.semester;
        }
        next.validate()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.is_empty() {
            return Err(AppError::ValidationError("Title is required".to_string()));
        }
        if self.venue.trim().is_empty() {
            return Err(AppError::ValidationError("Venue is required".to_string()));
        }
        if self.start_date >= self.end_date {
            return Err(AppError::ValidationError(
                "Start date must be before end date".to_string(),
            ));
        }
        if self.registration_deadline >= self.start_date {
            return Err(AppError::ValidationError(
                "Registration deadline must be before event start date".to_string(),
            ));
        }
        if matches!(self.max_participants, Some(max) if max <= 0) {
            return Err(AppError::ValidationError(
                "Max participants must be positive when set".to_string(),
            ));
        }
        if matches!(self.registration_fee, Some(fee) if fee.is_sign_negative()) {
            return Err(AppError::ValidationError(
                "Registration fee cannot be negative".to_string(),
            ));
        }
        if matches!(self.year, Some(year) if !(1..=4).contains(&year)) {
            return Err(AppError::ValidationError(
                "Year must be between 1 and 4".to_string(),
            ));
        }
        if matches!(self.semester, Some(semester) if !(1..=8).contains(&semester)) {
            return Err(AppError::ValidationError(
                "Semester must be between 1 and 8".to_string(),
            ));
        }
        if self.level == EventLevel::Class {
            if self.class_name.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(AppError::ValidationError(
                    "Class name is required for class-level events".to_string(),
                ));
            }
            if self.year.is_none() && self.semester.is_none() {
                return Err(AppError::ValidationError(
                    "Provide either year or semester for class-level events".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_owned_by(&self, principal_id: Uuid) -> bool {
        self.organizer_id == principal_id
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    pub(crate) fn new_event(venue: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> NewEvent {
        NewEvent {
            title: format!("Event at {}", venue),
            description: None,
            level: EventLevel::College,
            category: None,
            venue: venue.to_string(),
            start_date: start,
            end_date: end,
            registration_deadline: start - Duration::hours(1),
            max_participants: None,
            is_paid: false,
            registration_fee: None,
            class_name: None,
            year: None,
            semester: None,
        }
    }

    #[test]
    fn test_new_event_starts_pending() {
        let event = Event::from_new(new_event("Hall A", at(10), at(12)), Uuid::new_v4(), at(1)).unwrap();
        assert_eq!(event.status, EventStatus::Pending);
        assert!(event.approved_by.is_none());
        assert!(!event.completion_notified);
    }

    #[test]
    fn test_attendance_code_is_per_event_and_not_serialized() {
        let a = Event::from_new(new_event("Hall A", at(10), at(12)), Uuid::new_v4(), at(1)).unwrap();
        let b = Event::from_new(new_event("Hall A", at(10), at(12)), Uuid::new_v4(), at(1)).unwrap();
        assert_eq!(a.attendance_code.len(), 32);
        assert_ne!(a.attendance_code, b.attendance_code);

        let json = serde_json::to_value(&a).unwrap();
        assert!(json.get("attendance_code").is_none());
        assert_eq!(json["venue"], "Hall A");
    }

    #[test]
    fn test_schedule_ordering_is_enforced() {
        let err = Event::from_new(new_event("Hall A", at(12), at(10)), Uuid::new_v4(), at(1)).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let mut late_deadline = new_event("Hall A", at(10), at(12));
        late_deadline.registration_deadline = at(10);
        let err = Event::from_new(late_deadline, Uuid::new_v4(), at(1)).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_class_events_need_targeting() {
        let mut class = new_event("Room 101", at(10), at(12));
        class.level = EventLevel::Class;
        assert!(matches!(
            Event::from_new(class.clone(), Uuid::new_v4(), at(1)),
            Err(AppError::ValidationError(msg)) if msg.contains("Class name")
        ));

        class.class_name = Some("BSc.CSIT".to_string());
        assert!(matches!(
            Event::from_new(class.clone(), Uuid::new_v4(), at(1)),
            Err(AppError::ValidationError(msg)) if msg.contains("year or semester")
        ));

        class.semester = Some(3);
        assert!(Event::from_new(class, Uuid::new_v4(), at(1)).is_ok());
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut event = Event::from_new(new_event("Hall A", at(10), at(12)), Uuid::new_v4(), at(1)).unwrap();
        let bad = EventUpdate {
            venue: Some("Hall B".to_string()),
            end_date: Some(at(9)),
            ..EventUpdate::default()
        };
        assert!(event.apply_update(bad, at(2)).is_err());
        assert_eq!(event.venue, "Hall A");

        let good = EventUpdate {
            venue: Some("Hall B".to_string()),
            ..EventUpdate::default()
        };
        event.apply_update(good, at(2)).unwrap();
        assert_eq!(event.venue, "Hall B");
        assert_eq!(event.updated_at, at(2));
    }

    #[test]
    fn test_filter_matches_on_every_set_field() {
        let event = Event::from_new(new_event("Hall A", at(10), at(12)), Uuid::new_v4(), at(1)).unwrap();
        assert!(EventFilter::default().matches(&event));
        assert!(EventFilter::at_venue("Hall A").matches(&event));
        assert!(!EventFilter::at_venue("hall a").matches(&event));
        assert!(!EventFilter::with_status(EventStatus::Approved).matches(&event));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Approved".parse::<EventStatus>().unwrap(), EventStatus::Approved);
        assert!("archived".parse::<EventStatus>().is_err());
        assert!(!EventStatus::Cancelled.competes_for_venue());
        assert!(EventStatus::Completed.competes_for_venue());
    }
}
