//! Persistence seam for events, registrations, conflicts and feedback.
//!
//! The service layer only ever talks to [`Store`]; [`InMemoryStore`] backs
//! tests and database-less runs, [`PgStore`] backs production.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Conflict, ConflictFilter, Event, EventFilter, Feedback, Registration, RegistrationFilter,
    RegistrationStatus,
};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryDirectory, InMemoryStore};
pub use postgres::PgStore;

/// Outcome of a capacity-guarded registration insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AtCapacity,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, AppError>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, AppError>;

    /// Inserts or replaces the event with the same id.
    async fn save_event(&self, event: &Event) -> Result<(), AppError>;

    /// Removes the event together with its registrations, feedback and
    /// conflict entries. Returns false if nothing was deleted.
    async fn delete_event(&self, id: Uuid) -> Result<bool, AppError>;

    /// The (event, student) registration that is not cancelled, if any.
    async fn find_active_registration(
        &self,
        event_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Registration>, AppError>;

    async fn get_registration(&self, id: Uuid) -> Result<Option<Registration>, AppError>;

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, AppError>;

    /// Inserts the registration only if the event's confirmed count is still
    /// below `max_confirmed`. The count and the insert are one atomic step.
    /// A second active registration for the same (event, student) fails with
    /// [`AppError::DuplicateRegistration`].
    async fn insert_registration(
        &self,
        registration: &Registration,
        max_confirmed: Option<i32>,
    ) -> Result<InsertOutcome, AppError>;

    /// Overwrites a registration that is still active. Returns false, and
    /// writes nothing, once the stored row is cancelled or gone.
    async fn save_registration(&self, registration: &Registration) -> Result<bool, AppError>;

    async fn count_registrations(
        &self,
        event_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<i64, AppError>;

    async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>, AppError>;

    async fn save_conflict(&self, conflict: &Conflict) -> Result<(), AppError>;

    /// Fails with [`AppError::Duplicate`] if the registration already has feedback.
    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), AppError>;

    async fn list_feedback(&self, event_id: Uuid) -> Result<Vec<Feedback>, AppError>;
}
