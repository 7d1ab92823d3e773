//! Outbound notifications.
//!
//! The core only decides *who* should hear about a change and *what* they
//! are told. Resolving an [`Audience`] to concrete users and delivering the
//! message (in-app, e-mail) belongs to the [`Notifier`] implementation.
//! Delivery is best-effort: [`dispatch`] logs failures and never returns them.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Event, EventLevel, EventStatus, Role};
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Audience {
    User { id: Uuid },
    Role { role: Role },
    /// Students of the organizer's department.
    Department { organizer_id: Uuid },
    /// Members of the organizer's organization.
    Organization { organizer_id: Uuid },
    /// Students whose profile matches the class name and, where given, the
    /// year or the semester.
    Class {
        class_name: String,
        year: Option<i16>,
        semester: Option<i16>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EventCreated,
    EventUpdate,
    EventApproved,
    EventRejected,
    EventCancelled,
    EventCompleted,
    RegistrationConfirmation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::EventCreated => "event_created",
            NotificationKind::EventUpdate => "event_update",
            NotificationKind::EventApproved => "event_approved",
            NotificationKind::EventRejected => "event_rejected",
            NotificationKind::EventCancelled => "event_cancelled",
            NotificationKind::EventCompleted => "event_completed",
            NotificationKind::RegistrationConfirmation => "registration_confirmation",
        }
    }

    fn for_decision(status: EventStatus) -> Self {
        match status {
            EventStatus::Approved => NotificationKind::EventApproved,
            EventStatus::Rejected => NotificationKind::EventRejected,
            EventStatus::Cancelled => NotificationKind::EventCancelled,
            EventStatus::Completed => NotificationKind::EventCompleted,
            EventStatus::Pending => NotificationKind::EventUpdate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub audience: Audience,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub event_id: Uuid,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), AppError>;
}

/// Sends a notification and swallows any failure after logging it.
pub async fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    let kind = notification.kind.as_str();
    let event_id = notification.event_id;
    if let Err(e) = notifier.notify(notification).await {
        warn!(%event_id, kind, error = %e, "Notification delivery failed");
    }
}

/// Default sink: writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), AppError> {
        info!(
            event_id = %notification.event_id,
            kind = notification.kind.as_str(),
            audience = ?notification.audience,
            title = %notification.title,
            "Notification queued"
        );
        Ok(())
    }
}

/// Keeps every notification in memory, in order.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), AppError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.format("%b %d, %Y • %I:%M %p").to_string()
}

fn slots(event: &Event, confirmed: i64) -> String {
    match event.max_participants {
        Some(max) => format!("{} / {}", (i64::from(max) - confirmed).max(0), max),
        None => "unlimited".to_string(),
    }
}

/// Notification wording, with links back to the API.
#[derive(Debug, Clone)]
pub struct Templates {
    base_url: String,
}

impl Templates {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn event_url(&self, id: Uuid) -> String {
        format!("{}/api/v1/events/{}/", self.base_url, id)
    }

    pub fn register_url(&self, id: Uuid) -> String {
        format!("{}/api/v1/events/{}/register/", self.base_url, id)
    }

    fn summary(&self, event: &Event) -> String {
        format!(
            "Venue: {}\nTime: {} → {}",
            event.venue,
            fmt_dt(event.start_date),
            fmt_dt(event.end_date)
        )
    }

    /// Class-level events go straight to the targeted class.
    pub fn class_event_created(&self, event: &Event, confirmed: i64) -> Option<Notification> {
        let class_name = event.class_name.clone()?;
        if event.year.is_none() && event.semester.is_none() {
            return None;
        }
        Some(Notification {
            audience: Audience::Class {
                class_name,
                year: event.year,
                semester: event.semester,
            },
            title: format!("New Class Event: {}", event.title),
            message: format!(
                "{} has been scheduled for your class.\n\n{}\nSlots: {}\n\nDetails: {}\nRegister: {}",
                event.title,
                self.summary(event),
                slots(event, confirmed),
                self.event_url(event.id),
                self.register_url(event.id)
            ),
            kind: NotificationKind::EventCreated,
            event_id: event.id,
        })
    }

    pub fn submitted_for_approval(&self, event: &Event) -> Notification {
        Notification {
            audience: Audience::Role {
                role: Role::CampusChief,
            },
            title: format!("New Event Submitted: {}", event.title),
            message: format!(
                "{} has been submitted for approval.\n\n{}\n\nDetails: {}",
                event.title,
                self.summary(event),
                self.event_url(event.id)
            ),
            kind: NotificationKind::EventCreated,
            event_id: event.id,
        }
    }

    pub fn decision_for_organizer(&self, event: &Event) -> Notification {
        let mut message = format!(
            "Campus Chief has {} your event {}.\n\n{}",
            event.status,
            event.title,
            self.summary(event)
        );
        if let Some(comments) = &event.status_comments {
            message.push_str(&format!("\nComments: {}", comments));
        }
        message.push_str(&format!("\n\nDetails: {}", self.event_url(event.id)));

        Notification {
            audience: Audience::User {
                id: event.organizer_id,
            },
            title: format!("Your Event '{}' was {}", event.title, event.status),
            message,
            kind: NotificationKind::for_decision(event.status),
            event_id: event.id,
        }
    }

    /// Audience announcement after approval. Class events were announced at
    /// creation and get nothing here.
    pub fn approved_for_audience(&self, event: &Event, confirmed: i64) -> Option<Notification> {
        let audience = match event.level {
            EventLevel::Class => return None,
            EventLevel::College => Audience::Role {
                role: Role::Student,
            },
            EventLevel::Department => Audience::Department {
                organizer_id: event.organizer_id,
            },
            EventLevel::Organization => Audience::Organization {
                organizer_id: event.organizer_id,
            },
        };
        Some(Notification {
            audience,
            title: format!("Event Approved: {}", event.title),
            message: format!(
                "The {} event {} has been approved and is now open.\n\n{}\nSlots: {}\n\nDetails: {}\nRegister: {}",
                event.level,
                event.title,
                self.summary(event),
                slots(event, confirmed),
                self.event_url(event.id),
                self.register_url(event.id)
            ),
            kind: NotificationKind::EventApproved,
            event_id: event.id,
        })
    }

    /// Edits of live events go to students; edits still under review go to
    /// the approvers.
    pub fn updated(&self, event: &Event, previous: EventStatus) -> Option<Notification> {
        let (audience, title, lead) = if previous == EventStatus::Approved
            || event.status == EventStatus::Approved
        {
            (
                Audience::Role {
                    role: Role::Student,
                },
                format!("Event Updated: {}", event.title),
                format!("The event {} has been updated.", event.title),
            )
        } else if matches!(previous, EventStatus::Pending | EventStatus::Cancelled)
            || matches!(event.status, EventStatus::Pending | EventStatus::Cancelled)
        {
            (
                Audience::Role {
                    role: Role::CampusChief,
                },
                format!("Event Update Request: {}", event.title),
                format!(
                    "The event {} has been updated and requires your review.",
                    event.title
                ),
            )
        } else {
            return None;
        };

        Some(Notification {
            audience,
            title,
            message: format!(
                "{}\n\n{}\n\nDetails: {}",
                lead,
                self.summary(event),
                self.event_url(event.id)
            ),
            kind: NotificationKind::EventUpdate,
            event_id: event.id,
        })
    }

    pub fn completed(&self, event: &Event) -> Notification {
        Notification {
            audience: Audience::Role { role: Role::Admin },
            title: format!("Event Completed: {}", event.title),
            message: format!(
                "The event {} has been marked as completed.\n\n{}\n\nDetails: {}",
                event.title,
                self.summary(event),
                self.event_url(event.id)
            ),
            kind: NotificationKind::EventCompleted,
            event_id: event.id,
        }
    }

    pub fn registration_confirmed(&self, event: &Event, student_id: Uuid) -> Notification {
        Notification {
            audience: Audience::User { id: student_id },
            title: format!("Registration Successful: {}", event.title),
            message: format!(
                "You have successfully registered for {}.\n\n{}\n\nDetails: {}",
                event.title,
                self.summary(event),
                self.event_url(event.id)
            ),
            kind: NotificationKind::RegistrationConfirmation,
            event_id: event.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::tests::{at, new_event};

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _notification: Notification) -> Result<(), AppError> {
            Err(AppError::ExternalServiceError("smtp down".to_string()))
        }
    }

    fn event(level: EventLevel) -> Event {
        let mut new = new_event("Hall A", at(10), at(12));
        new.level = level;
        if level == EventLevel::Class {
            new.class_name = Some("BCA".to_string());
            new.year = Some(2);
        }
        Event::from_new(new, Uuid::new_v4(), at(1)).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let templates = Templates::new("http://localhost:3001");
        dispatch(&FailingNotifier, templates.completed(&event(EventLevel::College))).await;
    }

    #[test]
    fn test_approval_audience_follows_level() {
        let templates = Templates::new("http://localhost:3001/");
        let college = event(EventLevel::College);
        assert_eq!(
            templates.approved_for_audience(&college, 0).unwrap().audience,
            Audience::Role {
                role: Role::Student
            }
        );

        let department = event(EventLevel::Department);
        assert_eq!(
            templates.approved_for_audience(&department, 0).unwrap().audience,
            Audience::Department {
                organizer_id: department.organizer_id
            }
        );

        assert!(templates
            .approved_for_audience(&event(EventLevel::Class), 0)
            .is_none());
    }

    #[test]
    fn test_class_announcement_targets_class() {
        let templates = Templates::new("http://localhost:3001");
        let class = event(EventLevel::Class);
        let n = templates.class_event_created(&class, 0).unwrap();
        assert_eq!(
            n.audience,
            Audience::Class {
                class_name: "BCA".to_string(),
                year: Some(2),
                semester: None
            }
        );
        assert!(n.message.contains(&format!("http://localhost:3001/api/v1/events/{}/", class.id)));
    }

    #[test]
    fn test_update_routing() {
        let templates = Templates::new("http://localhost:3001");
        let mut live = event(EventLevel::College);
        live.status = EventStatus::Approved;
        assert_eq!(
            templates.updated(&live, EventStatus::Approved).unwrap().audience,
            Audience::Role {
                role: Role::Student
            }
        );

        let pending = event(EventLevel::College);
        assert_eq!(
            templates.updated(&pending, EventStatus::Pending).unwrap().audience,
            Audience::Role {
                role: Role::CampusChief
            }
        );

        let mut rejected = event(EventLevel::College);
        rejected.status = EventStatus::Rejected;
        assert!(templates.updated(&rejected, EventStatus::Rejected).is_none());
    }
}
