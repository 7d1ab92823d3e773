//! Registration gate: window, duplicates, capacity and identity, then
//! attendance and feedback.
//!
//! Everything that reads a confirmed count and then writes a registration
//! for the same event runs under that event's lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::identity;
use super::lifecycle;
use super::EventService;
use crate::models::{
    Capability, Event, EventStatus, Feedback, NewFeedback, Principal, Registration,
    RegistrationFilter, RegistrationStatus,
};
use crate::store::InsertOutcome;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStatistics {
    pub event_title: String,
    pub total_registrations: usize,
    pub confirmed_registrations: usize,
    pub attended_count: usize,
    pub attendance_rate: f64,
    pub feedback_count: usize,
    pub feedback_rate: f64,
    pub average_rating: f64,
    pub average_content_rating: f64,
    pub average_organization_rating: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

fn average(values: impl Iterator<Item = i16>) -> f64 {
    let (sum, count) = values.fold((0i64, 0usize), |(sum, n), v| (sum + i64::from(v), n + 1));
    if count == 0 {
        0.0
    } else {
        round2(sum as f64 / count as f64)
    }
}

fn not_registered() -> AppError {
    AppError::NotFound("You are not registered for this event.".to_string())
}

/// Open means the event is published and the deadline has not passed.
pub fn check_window(event: &Event, now: DateTime<Utc>) -> Result<(), AppError> {
    if lifecycle::effective_status(event, now) != EventStatus::Approved {
        return Err(AppError::Deadline(
            "This event is not open for registration.".to_string(),
        ));
    }
    if now > event.registration_deadline {
        return Err(AppError::Deadline(
            "Registration is closed for this event".to_string(),
        ));
    }
    Ok(())
}

pub fn check_existing(existing: Option<&Registration>) -> Result<(), AppError> {
    match existing.map(|r| r.status) {
        Some(RegistrationStatus::Pending) => Err(AppError::DuplicateRegistration(
            "Your registration is pending. Please complete the payment.".to_string(),
        )),
        Some(RegistrationStatus::Confirmed) => Err(AppError::DuplicateRegistration(
            "You are already registered for this event.".to_string(),
        )),
        Some(RegistrationStatus::Cancelled) | None => Ok(()),
    }
}

pub fn check_capacity(event: &Event, confirmed: i64) -> Result<(), AppError> {
    match event.max_participants {
        Some(max) if confirmed >= i64::from(max) => Err(AppError::Capacity(
            "Event is full. No more registrations are accepted.".to_string(),
        )),
        _ => Ok(()),
    }
}

impl EventService {
    pub async fn register(&self, principal: &Principal, event_id: Uuid) -> Result<Registration, AppError> {
        principal.require(Capability::Register, "Only students can register for events.")?;
        // Settle outside the lock; settling takes it too.
        self.settle_event(self.load_event(event_id).await?).await?;

        let _guard = self.locks.acquire(event_id).await;
        let event = self.load_event(event_id).await?;
        let now = self.now();

        check_window(&event, now)?;
        let existing = self
            .store
            .find_active_registration(event_id, principal.id)
            .await?;
        check_existing(existing.as_ref())?;
        let confirmed = self
            .store
            .count_registrations(event_id, RegistrationStatus::Confirmed)
            .await?;
        check_capacity(&event, confirmed)?;
        identity::verify(self.directory.as_ref(), principal).await?;

        let registration = Registration::for_event(&event, principal.id, now);
        let outcome = self
            .store
            .insert_registration(&registration, event.max_participants)
            .await?;
        if outcome == InsertOutcome::AtCapacity {
            return Err(AppError::Capacity(
                "Event is full. No more registrations are accepted.".to_string(),
            ));
        }

        info!(
            event_id = %event_id,
            student_id = %principal.id,
            registration_id = %registration.id,
            status = %registration.status,
            "Student registered"
        );
        self.notify(self.templates.registration_confirmed(&event, principal.id))
            .await;
        Ok(registration)
    }

    pub async fn cancel_registration(
        &self,
        principal: &Principal,
        event_id: Uuid,
    ) -> Result<Registration, AppError> {
        let _guard = self.locks.acquire(event_id).await;
        let mut registration = self
            .store
            .find_active_registration(event_id, principal.id)
            .await?
            .ok_or_else(not_registered)?;

        registration.status = RegistrationStatus::Cancelled;
        registration.updated_at = self.now();
        if !self.store.save_registration(&registration).await? {
            return Err(not_registered());
        }
        info!(event_id = %event_id, student_id = %principal.id, "Registration cancelled");
        Ok(registration)
    }

    /// Moves a paid registration from pending to confirmed once the fee is in.
    pub async fn confirm_payment(
        &self,
        principal: &Principal,
        registration_id: Uuid,
    ) -> Result<Registration, AppError> {
        principal.require(Capability::ConfirmPayments, "Only an admin can confirm payments.")?;
        let missing = || {
            AppError::NotFound(format!(
                "Registration with id '{}' was not found",
                registration_id
            ))
        };
        let event_id = self
            .store
            .get_registration(registration_id)
            .await?
            .ok_or_else(missing)?
            .event_id;

        let _guard = self.locks.acquire(event_id).await;
        let mut registration = self
            .store
            .get_registration(registration_id)
            .await?
            .ok_or_else(missing)?;
        if registration.status != RegistrationStatus::Pending {
            return Err(AppError::InvalidTransition(format!(
                "Only pending registrations can be confirmed; this one is {}.",
                registration.status
            )));
        }

        let event = self.load_event(event_id).await?;
        let confirmed = self
            .store
            .count_registrations(event_id, RegistrationStatus::Confirmed)
            .await?;
        check_capacity(&event, confirmed)?;

        registration.status = RegistrationStatus::Confirmed;
        registration.updated_at = self.now();
        if !self.store.save_registration(&registration).await? {
            return Err(missing());
        }
        info!(
            event_id = %event_id,
            registration_id = %registration.id,
            confirmed_by = %principal.id,
            "Payment confirmed"
        );
        Ok(registration)
    }

    /// Only while the event is running, and only with the code shown at the
    /// venue. Marking twice changes nothing.
    pub async fn mark_attended(
        &self,
        principal: &Principal,
        event_id: Uuid,
        code: &str,
    ) -> Result<Registration, AppError> {
        principal.require(Capability::Register, "Only students can mark attendance.")?;
        let _guard = self.locks.acquire(event_id).await;
        let event = self.load_event(event_id).await?;
        let now = self.now();
        if now < event.start_date || now >= event.end_date {
            return Err(AppError::Deadline(
                "Attendance can only be marked while the event is running.".to_string(),
            ));
        }
        if code.trim() != event.attendance_code {
            warn!(event_id = %event_id, student_id = %principal.id, "Invalid attendance code");
            return Err(AppError::ValidationError(
                "Invalid attendance code.".to_string(),
            ));
        }

        let mut registration = self
            .store
            .find_active_registration(event_id, principal.id)
            .await?
            .ok_or_else(not_registered)?;
        if registration.status == RegistrationStatus::Pending {
            return Err(AppError::InvalidTransition(
                "Your registration is pending. Please complete the payment.".to_string(),
            ));
        }
        if registration.attended {
            return Ok(registration);
        }

        registration.attended = true;
        registration.attendance_marked_at = Some(now);
        registration.updated_at = now;
        if !self.store.save_registration(&registration).await? {
            return Err(not_registered());
        }
        info!(event_id = %event_id, student_id = %principal.id, "Attendance marked");
        Ok(registration)
    }

    pub async fn submit_feedback(
        &self,
        principal: &Principal,
        event_id: Uuid,
        feedback: NewFeedback,
    ) -> Result<Feedback, AppError> {
        principal.require(Capability::Register, "Only students can give feedback.")?;
        let _guard = self.locks.acquire(event_id).await;
        self.load_event(event_id).await?;

        let mut registration = self
            .store
            .find_active_registration(event_id, principal.id)
            .await?
            .ok_or_else(not_registered)?;
        if !registration.attended {
            return Err(AppError::ValidationError(
                "Must attend event to give feedback".to_string(),
            ));
        }
        if registration.feedback_given {
            return Err(AppError::Duplicate(
                "Feedback has already been submitted for this event.".to_string(),
            ));
        }
        feedback.validate()?;

        let now = self.now();
        let feedback = feedback.into_feedback(&registration, now);
        self.store.insert_feedback(&feedback).await?;

        registration.feedback_given = true;
        registration.updated_at = now;
        if !self.store.save_registration(&registration).await? {
            return Err(not_registered());
        }
        info!(event_id = %event_id, student_id = %principal.id, rating = feedback.rating, "Feedback received");
        Ok(feedback)
    }

    /// Organizer of the event, or anyone holding the statistics capability.
    pub async fn statistics(
        &self,
        principal: &Principal,
        event_id: Uuid,
    ) -> Result<EventStatistics, AppError> {
        let event = self.settle_event(self.load_event(event_id).await?).await?;
        if !event.is_owned_by(principal.id) && !principal.can(Capability::ViewStatistics) {
            return Err(AppError::Forbidden(
                "You do not have permission to view statistics for this event.".to_string(),
            ));
        }

        let registrations = self
            .store
            .list_registrations(&RegistrationFilter::for_event(event_id))
            .await?;
        let feedback = self.store.list_feedback(event_id).await?;

        let confirmed = registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Confirmed)
            .count();
        let attended = registrations.iter().filter(|r| r.attended).count();

        Ok(EventStatistics {
            event_title: event.title,
            total_registrations: registrations.len(),
            confirmed_registrations: confirmed,
            attended_count: attended,
            attendance_rate: percent(attended, confirmed),
            feedback_count: feedback.len(),
            feedback_rate: percent(feedback.len(), attended),
            average_rating: average(feedback.iter().map(|f| f.rating)),
            average_content_rating: average(feedback.iter().map(|f| f.content_quality_rating)),
            average_organization_rating: average(feedback.iter().map(|f| f.organization_rating)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::tests::at;
    use crate::models::ExternalRecord;
    use crate::services::notification::NotificationKind;
    use crate::services::test_support::Harness;
    use rust_decimal::Decimal;

    async fn attend(
        h: &Harness,
        student: &Principal,
        event: &Event,
    ) -> Result<Registration, AppError> {
        h.service
            .mark_attended(student, event.id, &event.attendance_code)
            .await
    }

    fn rating(stars: i16) -> NewFeedback {
        NewFeedback {
            rating: stars,
            content_quality_rating: stars,
            organization_rating: stars,
            comments: String::new(),
            suggestions: None,
            would_recommend: true,
        }
    }

    #[test]
    fn test_window_closes_after_deadline() {
        let h = Harness::new();
        let mut event =
            Event::from_new(h.college_event("Hall A", 10, 12), Uuid::new_v4(), at(1)).unwrap();
        assert!(matches!(check_window(&event, at(2)), Err(AppError::Deadline(_))));

        event.status = EventStatus::Approved;
        assert!(check_window(&event, at(9)).is_ok());
        assert!(matches!(
            check_window(&event, at(9) + chrono::Duration::minutes(1)),
            Err(AppError::Deadline(msg)) if msg == "Registration is closed for this event"
        ));
    }

    #[test]
    fn test_capacity_counts_against_max() {
        let h = Harness::new();
        let mut new = h.college_event("Hall A", 10, 12);
        new.max_participants = Some(2);
        let event = Event::from_new(new, Uuid::new_v4(), at(1)).unwrap();
        assert!(check_capacity(&event, 1).is_ok());
        assert!(matches!(check_capacity(&event, 2), Err(AppError::Capacity(_))));
    }

    #[tokio::test]
    async fn test_free_registration_is_confirmed_and_announced() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let student = h.student("asha").await;

        let registration = h.service.register(&student, event.id).await.unwrap();
        assert_eq!(registration.status, RegistrationStatus::Confirmed);
        assert_eq!(h.notifier.count(NotificationKind::RegistrationConfirmation), 1);

        let err = h.service.register(&student, event.id).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateRegistration(msg) if msg.contains("already registered")));
    }

    #[tokio::test]
    async fn test_pending_events_refuse_registration() {
        let h = Harness::new();
        let event = h
            .service
            .create_event(&h.organizer, h.college_event("Hall A", 10, 12))
            .await
            .unwrap();
        let student = h.student("asha").await;
        let err = h.service.register(&student, event.id).await.unwrap_err();
        assert!(matches!(err, AppError::Deadline(_)));
    }

    #[tokio::test]
    async fn test_unknown_student_is_refused() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let stranger = Principal::new(Uuid::new_v4(), "ghost", crate::models::Role::Student)
            .with_contact(Some("ghost@college.edu".into()), None);

        let err = h.service.register(&stranger, event.id).await.unwrap_err();
        assert!(matches!(err, AppError::IdentityMismatch(_)));
        assert!(h
            .service
            .store()
            .find_active_registration(event.id, stranger.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_contact_mismatch_is_refused() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        h.directory
            .insert(ExternalRecord {
                username: "ravi".into(),
                email: Some("ravi@college.edu".into()),
                phone: Some("9800000001".into()),
            })
            .await;
        let ravi = Principal::new(Uuid::new_v4(), "ravi", crate::models::Role::Student)
            .with_contact(Some("ravi@gmail.com".into()), Some("9811111111".into()));

        let err = h.service.register(&ravi, event.id).await.unwrap_err();
        assert!(matches!(err, AppError::IdentityMismatch(msg) if msg.contains("does not match")));
    }

    #[tokio::test]
    async fn test_full_event_refuses_the_next_student() {
        let h = Harness::new();
        let mut new = h.college_event("Hall A", 10, 12);
        new.max_participants = Some(1);
        let event = h.approved(new).await;

        let first = h.student("asha").await;
        let second = h.student("bina").await;
        h.service.register(&first, event.id).await.unwrap();
        let err = h.service.register(&second, event.id).await.unwrap_err();
        assert!(matches!(err, AppError::Capacity(_)));
    }

    #[tokio::test]
    async fn test_cancel_then_register_again() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let student = h.student("asha").await;

        let err = h
            .service
            .cancel_registration(&student, event.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        h.service.register(&student, event.id).await.unwrap();
        let cancelled = h
            .service
            .cancel_registration(&student, event.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
        h.service.register(&student, event.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_paid_registration_waits_for_payment() {
        let h = Harness::new();
        let mut new = h.college_event("Hall A", 10, 12);
        new.is_paid = true;
        new.registration_fee = Some(Decimal::new(50000, 2));
        let event = h.approved(new).await;
        let student = h.student("asha").await;

        let registration = h.service.register(&student, event.id).await.unwrap();
        assert_eq!(registration.status, RegistrationStatus::Pending);
        let err = h.service.register(&student, event.id).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateRegistration(msg) if msg.contains("pending")));

        let err = h
            .service
            .confirm_payment(&h.chief, registration.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let confirmed = h
            .service
            .confirm_payment(&h.admin, registration.id)
            .await
            .unwrap();
        assert_eq!(confirmed.status, RegistrationStatus::Confirmed);
        let err = h
            .service
            .confirm_payment(&h.admin, registration.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_attendance_only_while_running() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let student = h.student("asha").await;
        h.service.register(&student, event.id).await.unwrap();

        let err = attend(&h, &student, &event).await.unwrap_err();
        assert!(matches!(err, AppError::Deadline(_)));

        h.clock.set(at(11));
        let marked = attend(&h, &student, &event).await.unwrap();
        assert!(marked.attended);
        assert_eq!(marked.attendance_marked_at, Some(at(11)));

        h.clock.set(at(11) + chrono::Duration::minutes(30));
        let again = attend(&h, &student, &event).await.unwrap();
        assert_eq!(again.attendance_marked_at, Some(at(11)));

        h.clock.set(at(12));
        assert!(attend(&h, &student, &event).await.is_err());
    }

    #[tokio::test]
    async fn test_attendance_needs_the_event_code() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let other = h.approved(h.college_event("Hall B", 10, 12)).await;
        let student = h.student("asha").await;
        h.service.register(&student, event.id).await.unwrap();
        h.clock.set(at(11));

        let err = h
            .service
            .mark_attended(&student, event.id, &other.attendance_code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg == "Invalid attendance code."));
        let stored = h
            .service
            .store()
            .find_active_registration(event.id, student.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.attended);

        assert!(attend(&h, &student, &event).await.unwrap().attended);
    }

    #[tokio::test]
    async fn test_cancel_racing_attendance_stays_cancelled() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let student = h.student("asha").await;
        h.service.register(&student, event.id).await.unwrap();
        h.clock.set(at(11));

        let (attended, cancelled) = tokio::join!(
            attend(&h, &student, &event),
            h.service.cancel_registration(&student, event.id),
        );
        assert_eq!(cancelled.unwrap().status, RegistrationStatus::Cancelled);
        match attended {
            Ok(registration) => assert!(registration.attended),
            Err(err) => assert!(matches!(err, AppError::NotFound(_))),
        }

        let all = h
            .service
            .store()
            .list_registrations(&RegistrationFilter::for_event(event.id))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, RegistrationStatus::Cancelled);
        assert!(h
            .service
            .store()
            .find_active_registration(event.id, student.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_feedback_waits_behind_a_cancellation() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let student = h.student("asha").await;
        h.service.register(&student, event.id).await.unwrap();
        h.clock.set(at(11));
        attend(&h, &student, &event).await.unwrap();

        let guard = h.service.locks.acquire(event.id).await;
        let cancel_while_held = async {
            tokio::task::yield_now().await;
            let mut registration = h
                .service
                .store()
                .find_active_registration(event.id, student.id)
                .await
                .unwrap()
                .unwrap();
            registration.status = RegistrationStatus::Cancelled;
            assert!(h.service.store().save_registration(&registration).await.unwrap());
            drop(guard);
        };
        let (feedback, ()) = tokio::join!(
            h.service.submit_feedback(&student, event.id, rating(5)),
            cancel_while_held,
        );
        assert!(matches!(feedback, Err(AppError::NotFound(_))));

        let all = h
            .service
            .store()
            .list_registrations(&RegistrationFilter::for_event(event.id))
            .await
            .unwrap();
        assert_eq!(all[0].status, RegistrationStatus::Cancelled);
        assert!(!all[0].feedback_given);
        assert!(h.service.store().list_feedback(event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_requires_attendance_and_is_once_only() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let student = h.student("asha").await;
        h.service.register(&student, event.id).await.unwrap();

        let err = h
            .service
            .submit_feedback(&student, event.id, rating(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg == "Must attend event to give feedback"));

        h.clock.set(at(11));
        attend(&h, &student, &event).await.unwrap();
        assert!(matches!(
            h.service.submit_feedback(&student, event.id, rating(6)).await,
            Err(AppError::ValidationError(_))
        ));
        h.service
            .submit_feedback(&student, event.id, rating(4))
            .await
            .unwrap();
        let err = h
            .service
            .submit_feedback(&student, event.id, rating(4))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_statistics_for_organizer_and_chief() {
        let h = Harness::new();
        let event = h.approved(h.college_event("Hall A", 10, 12)).await;
        let asha = h.student("asha").await;
        let bina = h.student("bina").await;
        let chandra = h.student("chandra").await;
        for student in [&asha, &bina, &chandra] {
            h.service.register(student, event.id).await.unwrap();
        }

        h.clock.set(at(11));
        attend(&h, &asha, &event).await.unwrap();
        attend(&h, &bina, &event).await.unwrap();
        h.service.submit_feedback(&asha, event.id, rating(5)).await.unwrap();
        h.service.submit_feedback(&bina, event.id, rating(4)).await.unwrap();

        let stats = h.service.statistics(&h.organizer, event.id).await.unwrap();
        assert_eq!(stats.total_registrations, 3);
        assert_eq!(stats.confirmed_registrations, 3);
        assert_eq!(stats.attended_count, 2);
        assert_eq!(stats.attendance_rate, 66.67);
        assert_eq!(stats.feedback_rate, 100.0);
        assert_eq!(stats.average_rating, 4.5);

        assert!(h.service.statistics(&h.chief, event.id).await.is_ok());
        assert!(matches!(
            h.service.statistics(&asha, event.id).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
