use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use super::{InsertOutcome, Store};
use crate::models::{
    Conflict, ConflictFilter, Event, EventFilter, ExternalRecord, Feedback, Registration,
    RegistrationFilter, RegistrationStatus,
};
use crate::services::identity::IdentityDirectory;
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| AppError::InternalServerError(format!("Migration failed: {}", e)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode<T>(column: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr<Err = AppError>,
{
    value.parse().map_err(|_| {
        AppError::InternalServerError(format!("Unexpected value '{}' in column {}", value, column))
    })
}

fn unique_violation(err: sqlx::Error, duplicate: AppError) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => duplicate,
        _ => AppError::DatabaseError(err),
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    organizer_id: Uuid,
    title: String,
    description: Option<String>,
    level: String,
    category: Option<String>,
    venue: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    registration_deadline: DateTime<Utc>,
    max_participants: Option<i32>,
    is_paid: bool,
    registration_fee: Option<Decimal>,
    status: String,
    status_comments: Option<String>,
    approved_by: Option<Uuid>,
    class_name: Option<String>,
    year: Option<i16>,
    semester: Option<i16>,
    completion_notified: bool,
    attendance_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            level: decode("events.level", &row.level)?,
            status: decode("events.status", &row.status)?,
            id: row.id,
            organizer_id: row.organizer_id,
            title: row.title,
            description: row.description,
            category: row.category,
            venue: row.venue,
            start_date: row.start_date,
            end_date: row.end_date,
            registration_deadline: row.registration_deadline,
            max_participants: row.max_participants,
            is_paid: row.is_paid,
            registration_fee: row.registration_fee,
            status_comments: row.status_comments,
            approved_by: row.approved_by,
            class_name: row.class_name,
            year: row.year,
            semester: row.semester,
            completion_notified: row.completion_notified,
            attendance_code: row.attendance_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct RegistrationRow {
    id: Uuid,
    event_id: Uuid,
    student_id: Uuid,
    status: String,
    attended: bool,
    feedback_given: bool,
    registered_at: DateTime<Utc>,
    attendance_marked_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = AppError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Registration {
            status: decode("registrations.status", &row.status)?,
            id: row.id,
            event_id: row.event_id,
            student_id: row.student_id,
            attended: row.attended,
            feedback_given: row.feedback_given,
            registered_at: row.registered_at,
            attendance_marked_at: row.attendance_marked_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ConflictRow {
    id: Uuid,
    event1_id: Uuid,
    event2_id: Uuid,
    description: String,
    status: String,
    detected_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConflictRow> for Conflict {
    type Error = AppError;

    fn try_from(row: ConflictRow) -> Result<Self, Self::Error> {
        Ok(Conflict {
            status: decode("conflicts.status", &row.status)?,
            id: row.id,
            event1_id: row.event1_id,
            event2_id: row.event2_id,
            description: row.description,
            detected_at: row.detected_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(FromRow)]
struct FeedbackRow {
    id: Uuid,
    registration_id: Uuid,
    event_id: Uuid,
    student_id: Uuid,
    rating: i16,
    content_quality_rating: i16,
    organization_rating: i16,
    comments: String,
    suggestions: Option<String>,
    would_recommend: bool,
    created_at: DateTime<Utc>,
}

impl From<FeedbackRow> for Feedback {
    fn from(row: FeedbackRow) -> Self {
        Feedback {
            id: row.id,
            registration_id: row.registration_id,
            event_id: row.event_id,
            student_id: row.student_id,
            rating: row.rating,
            content_quality_rating: row.content_quality_rating,
            organization_rating: row.organization_rating,
            comments: row.comments,
            suggestions: row.suggestions,
            would_recommend: row.would_recommend,
            created_at: row.created_at,
        }
    }
}

const INSERT_REGISTRATION: &str = r#"
INSERT INTO registrations
    (id, event_id, student_id, status, attended, feedback_given,
     registered_at, attendance_marked_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

#[async_trait]
impl Store for PgStore {
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, AppError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT * FROM events
            WHERE ($1::TEXT IS NULL OR level = $1)
              AND ($2::TEXT IS NULL OR category = $2)
              AND ($3::TEXT IS NULL OR status = $3)
              AND ($4::UUID IS NULL OR organizer_id = $4)
              AND ($5::TEXT IS NULL OR venue = $5)
            ORDER BY created_at, id
            "#,
        )
        .bind(filter.level.map(|l| l.as_str()))
        .bind(filter.category.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.organizer_id)
        .bind(filter.venue.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Event::try_from).transpose()
    }

    async fn save_event(&self, event: &Event) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, organizer_id, title, description, level, category, venue,
                 start_date, end_date, registration_deadline, max_participants,
                 is_paid, registration_fee, status, status_comments, approved_by,
                 class_name, year, semester, completion_notified, attendance_code,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                level = EXCLUDED.level,
                category = EXCLUDED.category,
                venue = EXCLUDED.venue,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                registration_deadline = EXCLUDED.registration_deadline,
                max_participants = EXCLUDED.max_participants,
                is_paid = EXCLUDED.is_paid,
                registration_fee = EXCLUDED.registration_fee,
                status = EXCLUDED.status,
                status_comments = EXCLUDED.status_comments,
                approved_by = EXCLUDED.approved_by,
                class_name = EXCLUDED.class_name,
                year = EXCLUDED.year,
                semester = EXCLUDED.semester,
                completion_notified = EXCLUDED.completion_notified,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event.id)
        .bind(event.organizer_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.level.as_str())
        .bind(&event.category)
        .bind(&event.venue)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.registration_deadline)
        .bind(event.max_participants)
        .bind(event.is_paid)
        .bind(event.registration_fee)
        .bind(event.status.as_str())
        .bind(&event.status_comments)
        .bind(event.approved_by)
        .bind(&event.class_name)
        .bind(event.year)
        .bind(event.semester)
        .bind(event.completion_notified)
        .bind(&event.attendance_code)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_active_registration(
        &self,
        event_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Registration>, AppError> {
        let row = sqlx::query_as::<_, RegistrationRow>(
            r#"
            SELECT * FROM registrations
            WHERE event_id = $1 AND student_id = $2 AND status <> 'cancelled'
            "#,
        )
        .bind(event_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Registration::try_from).transpose()
    }

    async fn get_registration(&self, id: Uuid) -> Result<Option<Registration>, AppError> {
        let row = sqlx::query_as::<_, RegistrationRow>("SELECT * FROM registrations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Registration::try_from).transpose()
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, AppError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(
            r#"
            SELECT * FROM registrations
            WHERE ($1::UUID IS NULL OR event_id = $1)
              AND ($2::UUID IS NULL OR student_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY registered_at, id
            "#,
        )
        .bind(filter.event_id)
        .bind(filter.student_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Registration::try_from).collect()
    }

    async fn insert_registration(
        &self,
        registration: &Registration,
        max_confirmed: Option<i32>,
    ) -> Result<InsertOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serializes every capacity check for this event behind the row lock.
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM events WHERE id = $1 FOR UPDATE")
                .bind(registration.event_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!(
                "Event {} was not found",
                registration.event_id
            )));
        }

        if let Some(max) = max_confirmed {
            let (confirmed,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = 'confirmed'",
            )
            .bind(registration.event_id)
            .fetch_one(&mut *tx)
            .await?;
            if confirmed >= i64::from(max) {
                tx.rollback().await?;
                return Ok(InsertOutcome::AtCapacity);
            }
        }

        sqlx::query(INSERT_REGISTRATION)
            .bind(registration.id)
            .bind(registration.event_id)
            .bind(registration.student_id)
            .bind(registration.status.as_str())
            .bind(registration.attended)
            .bind(registration.feedback_given)
            .bind(registration.registered_at)
            .bind(registration.attendance_marked_at)
            .bind(registration.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                unique_violation(
                    e,
                    AppError::DuplicateRegistration(
                        "You are already registered for this event.".to_string(),
                    ),
                )
            })?;

        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn save_registration(&self, registration: &Registration) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE registrations SET
                status = $2,
                attended = $3,
                feedback_given = $4,
                attendance_marked_at = $5,
                updated_at = $6
            WHERE id = $1 AND status <> 'cancelled'
            "#,
        )
        .bind(registration.id)
        .bind(registration.status.as_str())
        .bind(registration.attended)
        .bind(registration.feedback_given)
        .bind(registration.attendance_marked_at)
        .bind(registration.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_registrations(
        &self,
        event_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = $2",
        )
        .bind(event_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>, AppError> {
        let rows = sqlx::query_as::<_, ConflictRow>(
            r#"
            SELECT * FROM conflicts
            WHERE ($1::UUID IS NULL OR event1_id = $1 OR event2_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY detected_at, id
            "#,
        )
        .bind(filter.event_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Conflict::try_from).collect()
    }

    async fn save_conflict(&self, conflict: &Conflict) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO conflicts
                (id, event1_id, event2_id, description, status, detected_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                resolved_at = EXCLUDED.resolved_at
            "#,
        )
        .bind(conflict.id)
        .bind(conflict.event1_id)
        .bind(conflict.event2_id)
        .bind(&conflict.description)
        .bind(conflict.status.as_str())
        .bind(conflict.detected_at)
        .bind(conflict.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(
                e,
                AppError::Duplicate("Conflict pair is already recorded".to_string()),
            )
        })?;
        Ok(())
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO feedback
                (id, registration_id, event_id, student_id, rating,
                 content_quality_rating, organization_rating, comments,
                 suggestions, would_recommend, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.registration_id)
        .bind(feedback.event_id)
        .bind(feedback.student_id)
        .bind(feedback.rating)
        .bind(feedback.content_quality_rating)
        .bind(feedback.organization_rating)
        .bind(&feedback.comments)
        .bind(&feedback.suggestions)
        .bind(feedback.would_recommend)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, AppError::Duplicate("Feedback already submitted".to_string()))
        })?;
        Ok(())
    }

    async fn list_feedback(&self, event_id: Uuid) -> Result<Vec<Feedback>, AppError> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            "SELECT * FROM feedback WHERE event_id = $1 ORDER BY created_at, id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Feedback::from).collect())
    }
}

#[async_trait]
impl IdentityDirectory for PgStore {
    async fn lookup(&self, username: &str) -> Result<Option<ExternalRecord>, AppError> {
        let row: Option<(String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT username, email, phone_number FROM college_students WHERE username = $1 LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(username, email, phone)| ExternalRecord {
            username,
            email,
            phone,
        }))
    }
}
