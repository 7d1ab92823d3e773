//! Event status state machine.
//!
//! ```text
//! pending --approve--> approved --(end_date passes)--> completed
//!    |--reject--> rejected
//!    `--cancel--> cancelled
//! ```
//!
//! Only `pending` accepts a decision. `completed` is never written by a
//! decision: it is derived from the clock by [`effective_status`] and
//! persisted lazily on read.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{Capability, Event, EventLevel, EventStatus, Principal, Role};
use crate::utils::error::AppError;

/// An approver's decision on a pending event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { comment: String },
    Cancel { comment: String },
}

/// Wire shape of a decision: `{"status": "...", "status_comments": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub status: Option<String>,
    pub status_comments: Option<String>,
}

impl TryFrom<DecisionRequest> for Decision {
    type Error = AppError;

    fn try_from(request: DecisionRequest) -> Result<Self, Self::Error> {
        let status = request.status.unwrap_or_default();
        if status.trim().is_empty() {
            return Err(AppError::ValidationError(
                "You must provide a status to approve/reject/cancel the event.".to_string(),
            ));
        }
        let comment = request
            .status_comments
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let require_comment = |comment: Option<String>, status: &str| {
            comment.ok_or_else(|| {
                AppError::ValidationError(format!(
                    "A status comment is required when status is '{}'.",
                    status
                ))
            })
        };

        match status.parse::<EventStatus>() {
            Ok(EventStatus::Approved) => Ok(Decision::Approve),
            Ok(EventStatus::Rejected) => Ok(Decision::Reject {
                comment: require_comment(comment, "rejected")?,
            }),
            Ok(EventStatus::Cancelled) => Ok(Decision::Cancel {
                comment: require_comment(comment, "cancelled")?,
            }),
            _ => Err(AppError::ValidationError(
                "Status must be either 'approved' or 'rejected' or 'cancelled'".to_string(),
            )),
        }
    }
}

impl Decision {
    pub fn target(&self) -> EventStatus {
        match self {
            Decision::Approve => EventStatus::Approved,
            Decision::Reject { .. } => EventStatus::Rejected,
            Decision::Cancel { .. } => EventStatus::Cancelled,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match self {
            Decision::Approve => None,
            Decision::Reject { comment } | Decision::Cancel { comment } => Some(comment),
        }
    }
}

/// Checks that `decision` is legal from `current`. Conflict checks for
/// approvals happen in the service, against the live store.
pub fn transition(current: EventStatus, decision: &Decision) -> Result<EventStatus, AppError> {
    match current {
        EventStatus::Pending => Ok(decision.target()),
        EventStatus::Approved => Err(AppError::InvalidTransition(
            "Already approved event cannot be approved, rejected or cancelled again.".to_string(),
        )),
        terminal => Err(AppError::InvalidTransition(format!(
            "Event is {} and no longer accepts decisions.",
            terminal
        ))),
    }
}

/// Applies a decision that [`transition`] accepted.
pub fn apply_decision(
    event: &mut Event,
    decision: &Decision,
    approver: &Principal,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let next = transition(event.status, decision)?;
    event.status = next;
    event.status_comments = decision.comment().map(str::to_string);
    event.approved_by = Some(approver.id);
    event.updated_at = now;
    Ok(())
}

/// Status as it should read at `now`: approved events whose end has passed
/// are completed.
pub fn effective_status(event: &Event, now: DateTime<Utc>) -> EventStatus {
    if event.status == EventStatus::Approved && event.end_date < now {
        EventStatus::Completed
    } else {
        event.status
    }
}

/// Moves `event` to its effective status. Returns true when something changed.
pub fn settle(event: &mut Event, now: DateTime<Utc>) -> bool {
    let status = effective_status(event, now);
    if status == event.status {
        return false;
    }
    event.status = status;
    event.updated_at = now;
    true
}

/// Class events from an organizer holding the auto-approval capability skip
/// the review queue.
pub fn auto_approves(event: &Event, organizer: Role) -> bool {
    event.level == EventLevel::Class && organizer.allows(Capability::AutoApproveClassEvents)
}

/// Whether `principal` may see `event` in listings and details. Everyone
/// sees published (approved or completed) events.
pub fn is_visible(event: &Event, principal: &Principal) -> bool {
    if principal.can(Capability::ViewAllEvents) {
        return true;
    }
    let published = matches!(event.status, EventStatus::Approved | EventStatus::Completed);
    match principal.role {
        Role::Department | Role::Organization => event.is_owned_by(principal.id) || published,
        _ => published,
    }
}
