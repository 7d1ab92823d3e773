use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InsertOutcome, Store};
use crate::models::{
    Conflict, ConflictFilter, Event, EventFilter, ExternalRecord, Feedback, Registration,
    RegistrationFilter, RegistrationStatus,
};
use crate::services::identity::IdentityDirectory;
use crate::utils::error::AppError;

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    registrations: HashMap<Uuid, Registration>,
    conflicts: HashMap<Uuid, Conflict>,
    feedback: HashMap<Uuid, Feedback>,
}

/// Process-local store. A single lock covers every table, so each call is
/// atomic with respect to every other call.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, AppError> {
        let tables = self.tables.read().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        Ok(events)
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn save_event(&self, event: &Event) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .events
            .insert(event.id, event.clone());
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.events.remove(&id).is_none() {
            return Ok(false);
        }
        tables.registrations.retain(|_, r| r.event_id != id);
        tables.feedback.retain(|_, f| f.event_id != id);
        tables.conflicts.retain(|_, c| !c.involves(id));
        Ok(true)
    }

    async fn find_active_registration(
        &self,
        event_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Registration>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .registrations
            .values()
            .find(|r| r.event_id == event_id && r.student_id == student_id && r.status.is_active())
            .cloned())
    }

    async fn get_registration(&self, id: Uuid) -> Result<Option<Registration>, AppError> {
        Ok(self.tables.read().await.registrations.get(&id).cloned())
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, AppError> {
        let tables = self.tables.read().await;
        let mut registrations: Vec<Registration> = tables
            .registrations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        registrations.sort_by_key(|r| (r.registered_at, r.id));
        Ok(registrations)
    }

    async fn insert_registration(
        &self,
        registration: &Registration,
        max_confirmed: Option<i32>,
    ) -> Result<InsertOutcome, AppError> {
        let mut tables = self.tables.write().await;

        let duplicate = tables.registrations.values().any(|r| {
            r.event_id == registration.event_id
                && r.student_id == registration.student_id
                && r.status.is_active()
        });
        if duplicate {
            return Err(AppError::DuplicateRegistration(
                "You are already registered for this event.".to_string(),
            ));
        }

        if let Some(max) = max_confirmed {
            let confirmed = tables
                .registrations
                .values()
                .filter(|r| {
                    r.event_id == registration.event_id
                        && r.status == RegistrationStatus::Confirmed
                })
                .count();
            if confirmed >= max.max(0) as usize {
                return Ok(InsertOutcome::AtCapacity);
            }
        }

        tables
            .registrations
            .insert(registration.id, registration.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn save_registration(&self, registration: &Registration) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.registrations.get_mut(&registration.id) {
            Some(stored) if stored.status.is_active() => {
                *stored = registration.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_registrations(
        &self,
        event_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<i64, AppError> {
        let tables = self.tables.read().await;
        let count = tables
            .registrations
            .values()
            .filter(|r| r.event_id == event_id && r.status == status)
            .count();
        Ok(count as i64)
    }

    async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>, AppError> {
        let tables = self.tables.read().await;
        let mut conflicts: Vec<Conflict> = tables
            .conflicts
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        conflicts.sort_by_key(|c| (c.detected_at, c.id));
        Ok(conflicts)
    }

    async fn save_conflict(&self, conflict: &Conflict) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        // At most one detected entry per unordered pair.
        let taken = conflict.is_detected()
            && tables.conflicts.values().any(|c| {
                c.id != conflict.id
                    && c.is_detected()
                    && c.is_pair(conflict.event1_id, conflict.event2_id)
            });
        if taken {
            return Err(AppError::Duplicate(
                "Conflict pair is already recorded".to_string(),
            ));
        }
        tables.conflicts.insert(conflict.id, conflict.clone());
        Ok(())
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .feedback
            .values()
            .any(|f| f.registration_id == feedback.registration_id)
        {
            return Err(AppError::Duplicate("Feedback already submitted".to_string()));
        }
        tables.feedback.insert(feedback.id, feedback.clone());
        Ok(())
    }

    async fn list_feedback(&self, event_id: Uuid) -> Result<Vec<Feedback>, AppError> {
        let tables = self.tables.read().await;
        let mut feedback: Vec<Feedback> = tables
            .feedback
            .values()
            .filter(|f| f.event_id == event_id)
            .cloned()
            .collect();
        feedback.sort_by_key(|f| (f.created_at, f.id));
        Ok(feedback)
    }
}

/// Student directory held in memory, keyed by username.
#[derive(Default)]
pub struct InMemoryDirectory {
    records: RwLock<HashMap<String, ExternalRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: ExternalRecord) {
        self.records
            .write()
            .await
            .insert(record.username.clone(), record);
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn lookup(&self, username: &str) -> Result<Option<ExternalRecord>, AppError> {
        Ok(self.records.read().await.get(username).cloned())
    }
}
