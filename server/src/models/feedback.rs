use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::registration::Registration;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub student_id: Uuid,
    pub rating: i16,
    pub content_quality_rating: i16,
    pub organization_rating: i16,
    pub comments: String,
    pub suggestions: Option<String>,
    pub would_recommend: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub rating: i16,
    pub content_quality_rating: i16,
    pub organization_rating: i16,
    #[serde(default)]
    pub comments: String,
    pub suggestions: Option<String>,
    #[serde(default = "default_recommend")]
    pub would_recommend: bool,
}

fn default_recommend() -> bool {
    true
}

const RATING_RANGE: std::ops::RangeInclusive<i16> = 1..=5;

impl NewFeedback {
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("rating", self.rating),
            ("content_quality_rating", self.content_quality_rating),
            ("organization_rating", self.organization_rating),
        ] {
            if !RATING_RANGE.contains(&value) {
                return Err(AppError::ValidationError(format!(
                    "{} must be between 1 and 5",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn into_feedback(self, registration: &Registration, now: DateTime<Utc>) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            registration_id: registration.id,
            event_id: registration.event_id,
            student_id: registration.student_id,
            rating: self.rating,
            content_quality_rating: self.content_quality_rating,
            organization_rating: self.organization_rating,
            comments: self.comments,
            suggestions: self.suggestions,
            would_recommend: self.would_recommend,
            created_at: now,
        }
    }
}
