use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::services::EventService;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod events;
pub mod principal;
pub mod registrations;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EventService>,
}

impl AppState {
    pub fn new(service: EventService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "campus-events-api",
    };

    success(payload, "Health check successful")
}

// Extractor rejections are turned into the error envelope instead of
// axum's plain-text bodies.

pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| AppError::ValidationError(e.body_text()))
}

pub(crate) fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|Query(value)| value)
        .map_err(|e| AppError::ValidationError(e.body_text()))
}

pub(crate) fn id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|e| AppError::ValidationError(e.body_text()))
}
