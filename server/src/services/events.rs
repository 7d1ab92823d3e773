use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::lifecycle::{self, Decision};
use super::registration;
use super::EventService;
use crate::models::{
    Capability, Conflict, ConflictFilter, Event, EventFilter, EventLevel, EventStatus,
    EventUpdate, EventView, NewEvent, Principal, RegisteredEvent, RegistrationFilter, RegistrationStatus,
};
use crate::utils::error::AppError;

/// What "my events" means depends on who asks.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MyEvents {
    Registered(Vec<RegisteredEvent>),
    Organized(Vec<Event>),
}

impl MyEvents {
    pub fn len(&self) -> usize {
        match self {
            MyEvents::Registered(events) => events.len(),
            MyEvents::Organized(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn newest_first(events: &mut [Event]) {
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn ensure_owner(event: &Event, principal: &Principal) -> Result<(), AppError> {
    if event.is_owned_by(principal.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You are not the organizer of this event.".to_string(),
        ))
    }
}

impl EventService {
    /// Persists the derived `completed` status and announces it once.
    pub(crate) async fn settle_event(&self, event: Event) -> Result<Event, AppError> {
        if event.completion_notified
            || lifecycle::effective_status(&event, self.now()) != EventStatus::Completed
        {
            return Ok(event);
        }

        let _guard = self.locks.acquire(event.id).await;
        // Re-read under the lock; another reader may have settled it already.
        let Some(mut event) = self.store.get_event(event.id).await? else {
            return Ok(event);
        };
        let changed = lifecycle::settle(&mut event, self.now());
        if event.status != EventStatus::Completed || event.completion_notified {
            return Ok(event);
        }
        event.completion_notified = true;
        self.store.save_event(&event).await?;
        if changed {
            info!(event_id = %event.id, "Event completed");
        }
        self.notify(self.templates.completed(&event)).await;
        Ok(event)
    }

    pub(crate) async fn settle_events(&self, events: Vec<Event>) -> Result<Vec<Event>, AppError> {
        let mut settled = Vec::with_capacity(events.len());
        for event in events {
            settled.push(self.settle_event(event).await?);
        }
        Ok(settled)
    }

    pub async fn create_event(&self, principal: &Principal, new: NewEvent) -> Result<Event, AppError> {
        principal.require(
            Capability::CreateEvents,
            "Only departments and organizations can create events.",
        )?;

        let mut event = Event::from_new(new, principal.id, self.now())?;
        if lifecycle::auto_approves(&event, principal.role) {
            event.status = EventStatus::Approved;
        }
        self.store.save_event(&event).await?;

        let conflicting = self.find_conflicts(&event).await?;
        self.record_conflicts(&event, &conflicting).await?;

        info!(
            event_id = %event.id,
            organizer_id = %principal.id,
            level = %event.level,
            status = %event.status,
            conflicts = conflicting.len(),
            "Event created"
        );

        if event.level == EventLevel::Class {
            self.notify_opt(self.templates.class_event_created(&event, 0))
                .await;
        } else {
            self.notify(self.templates.submitted_for_approval(&event))
                .await;
        }
        Ok(event)
    }

    /// Events visible to `principal`, newest first. The status filter applies
    /// to effective statuses.
    pub async fn list_events(
        &self,
        principal: &Principal,
        filter: EventFilter,
    ) -> Result<Vec<Event>, AppError> {
        let scan = EventFilter {
            status: None,
            ..filter.clone()
        };
        let events = self.store.list_events(&scan).await?;
        let mut events: Vec<Event> = self
            .settle_events(events)
            .await?
            .into_iter()
            .filter(|e| lifecycle::is_visible(e, principal) && filter.matches(e))
            .collect();
        newest_first(&mut events);
        Ok(events)
    }

    /// Adds the registration figures, and the attendance code for those
    /// allowed to see it.
    pub async fn describe(&self, principal: &Principal, event: Event) -> Result<EventView, AppError> {
        let registered_count = self
            .store
            .count_registrations(event.id, RegistrationStatus::Confirmed)
            .await?;
        let available_slots = event
            .max_participants
            .map(|max| (i64::from(max) - registered_count).max(0));
        let is_registration_open = available_slots != Some(0)
            && registration::check_window(&event, self.now()).is_ok();
        let attendance_code = (event.is_owned_by(principal.id)
            || principal.can(Capability::ViewAttendanceCodes))
        .then(|| event.attendance_code.clone());

        Ok(EventView {
            event,
            attendance_code,
            registered_count,
            available_slots,
            is_registration_open,
        })
    }

    pub async fn describe_all(
        &self,
        principal: &Principal,
        events: Vec<Event>,
    ) -> Result<Vec<EventView>, AppError> {
        let mut views = Vec::with_capacity(events.len());
        for event in events {
            views.push(self.describe(principal, event).await?);
        }
        Ok(views)
    }

    /// Invisible events read as missing.
    pub async fn get_event(&self, principal: &Principal, id: Uuid) -> Result<Event, AppError> {
        let event = self.settle_event(self.load_event(id).await?).await?;
        if !lifecycle::is_visible(&event, principal) {
            return Err(AppError::NotFound(format!(
                "Event with id '{}' was not found",
                id
            )));
        }
        Ok(event)
    }

    pub async fn update_event(
        &self,
        principal: &Principal,
        id: Uuid,
        update: EventUpdate,
    ) -> Result<Event, AppError> {
        // Settle outside the lock; settling takes it too.
        self.settle_event(self.load_event(id).await?).await?;
        let _guard = self.locks.acquire(id).await;
        let mut event = self.load_event(id).await?;
        ensure_owner(&event, principal)?;

        let previous = event.status;
        let reschedule = update.touches_schedule();
        event.apply_update(update, self.now())?;
        self.store.save_event(&event).await?;
        info!(event_id = %event.id, status = %event.status, "Event updated");

        if reschedule {
            self.reconcile(&event).await?;
        }
        self.notify_opt(self.templates.updated(&event, previous))
            .await;
        Ok(event)
    }

    pub async fn delete_event(&self, principal: &Principal, id: Uuid) -> Result<(), AppError> {
        let event = self.load_event(id).await?;
        ensure_owner(&event, principal)?;

        if !self.store.delete_event(id).await? {
            return Err(AppError::NotFound(format!(
                "Event with id '{}' was not found",
                id
            )));
        }
        self.locks.forget(id);
        info!(event_id = %id, organizer_id = %principal.id, "Event deleted");
        Ok(())
    }

    /// Approve, reject or cancel a pending event.
    pub async fn decide(
        &self,
        principal: &Principal,
        id: Uuid,
        decision: Decision,
    ) -> Result<Event, AppError> {
        principal.require(
            Capability::DecideEvents,
            "Only the campus chief can approve, reject or cancel events.",
        )?;

        self.settle_event(self.load_event(id).await?).await?;
        let _guard = self.locks.acquire(id).await;
        let mut event = self.load_event(id).await?;
        lifecycle::transition(event.status, &decision)?;

        if decision == Decision::Approve {
            let conflicting = self.find_conflicts(&event).await?;
            if !conflicting.is_empty() {
                self.record_conflicts(&event, &conflicting).await?;
                let titles: Vec<&str> = conflicting.iter().map(|e| e.title.as_str()).collect();
                warn!(event_id = %event.id, conflicts = conflicting.len(), "Approval refused");
                return Err(AppError::Conflict(format!(
                    "Event conflict detected with: {}",
                    titles.join(", ")
                )));
            }
        }

        lifecycle::apply_decision(&mut event, &decision, principal, self.now())?;
        self.store.save_event(&event).await?;
        info!(
            event_id = %event.id,
            approver_id = %principal.id,
            status = %event.status,
            "Event decision recorded"
        );
        if !event.status.competes_for_venue() {
            // Rejected and cancelled events release every pair they were part of.
            self.reconcile(&event).await?;
        }

        self.notify(self.templates.decision_for_organizer(&event))
            .await;
        if event.status == EventStatus::Approved && event.level != EventLevel::Class {
            let confirmed = self
                .store
                .count_registrations(event.id, RegistrationStatus::Confirmed)
                .await?;
            self.notify_opt(self.templates.approved_for_audience(&event, confirmed))
                .await;
        }
        Ok(event)
    }

    /// Review queue, newest submissions first.
    pub async fn pending_events(&self, principal: &Principal) -> Result<Vec<Event>, AppError> {
        principal.require(
            Capability::ViewReviewQueues,
            "Only the campus chief or an admin can view pending events.",
        )?;
        let mut events = self
            .store
            .list_events(&EventFilter::with_status(EventStatus::Pending))
            .await?;
        newest_first(&mut events);
        Ok(events)
    }

    pub async fn cancelled_events(&self, principal: &Principal) -> Result<Vec<Event>, AppError> {
        principal.require(
            Capability::ViewReviewQueues,
            "Only the campus chief or an admin can view cancelled events.",
        )?;
        let mut events = self
            .store
            .list_events(&EventFilter::with_status(EventStatus::Cancelled))
            .await?;
        events.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(events)
    }

    /// Past events, latest end first. Open to everyone.
    pub async fn completed_events(&self) -> Result<Vec<Event>, AppError> {
        let approved = self
            .store
            .list_events(&EventFilter::with_status(EventStatus::Approved))
            .await?;
        let mut events: Vec<Event> = self
            .settle_events(approved)
            .await?
            .into_iter()
            .filter(|e| e.status == EventStatus::Completed)
            .collect();
        let mut seen: HashSet<Uuid> = events.iter().map(|e| e.id).collect();
        let stored = self
            .store
            .list_events(&EventFilter::with_status(EventStatus::Completed))
            .await?;
        events.extend(stored.into_iter().filter(|e| seen.insert(e.id)));
        events.sort_by(|a, b| b.end_date.cmp(&a.end_date));
        Ok(events)
    }

    pub async fn my_events(&self, principal: &Principal) -> Result<MyEvents, AppError> {
        if principal.can(Capability::Register) {
            let registrations = self
                .store
                .list_registrations(&RegistrationFilter::for_student(principal.id))
                .await?;
            let mut registered = Vec::new();
            for registration in registrations.iter().filter(|r| r.status.is_active()) {
                let Some(event) = self.store.get_event(registration.event_id).await? else {
                    continue;
                };
                registered.push(RegisteredEvent {
                    event: self.settle_event(event).await?,
                    registration_status: registration.status,
                    attended: registration.attended,
                    feedback_given: registration.feedback_given,
                });
            }
            registered.sort_by(|a, b| a.event.start_date.cmp(&b.event.start_date));
            return Ok(MyEvents::Registered(registered));
        }

        let filter = if principal.can(Capability::ListAllEvents) {
            EventFilter::default()
        } else if principal.can(Capability::ListOwnEvents) {
            EventFilter {
                organizer_id: Some(principal.id),
                ..EventFilter::default()
            }
        } else {
            return Err(AppError::Forbidden(
                "The campus chief has no events of their own; use the review queues.".to_string(),
            ));
        };

        let events = self.store.list_events(&filter).await?;
        let mut events = self.settle_events(events).await?;
        newest_first(&mut events);
        Ok(MyEvents::Organized(events))
    }

    /// Conflicts still awaiting attention, most recent first.
    pub async fn list_conflicts(&self, principal: &Principal) -> Result<Vec<Conflict>, AppError> {
        principal.require(
            Capability::ViewConflicts,
            "Only the campus chief or an admin can view conflicts.",
        )?;
        let mut conflicts = self.store.list_conflicts(&ConflictFilter::detected()).await?;
        conflicts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(conflicts)
    }
}
