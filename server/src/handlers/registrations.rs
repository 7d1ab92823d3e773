use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use super::{body, id, AppState};
use crate::models::{AttendanceCode, NewFeedback, Principal, RegistrationStatus};
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn register(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let registration = state.service.register(&principal, id(path)?).await?;
    let message = match registration.status {
        RegistrationStatus::Pending => "Registration received. Please complete the payment.",
        _ => "Successfully registered for the event",
    };
    Ok(created(registration, message))
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let registration = state
        .service
        .cancel_registration(&principal, id(path)?)
        .await?;
    Ok(success(registration, "Registration cancelled successfully"))
}

pub async fn mark_attendance(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AttendanceCode>, JsonRejection>,
) -> Result<Response, AppError> {
    let event_id = id(path)?;
    let AttendanceCode { code } = body(payload)?;
    let registration = state
        .service
        .mark_attended(&principal, event_id, &code)
        .await?;
    Ok(success(registration, "Attendance marked successfully"))
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<NewFeedback>, JsonRejection>,
) -> Result<Response, AppError> {
    let feedback = state
        .service
        .submit_feedback(&principal, id(path)?, body(payload)?)
        .await?;
    Ok(created(feedback, "Feedback submitted successfully"))
}

pub async fn statistics(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let stats = state.service.statistics(&principal, id(path)?).await?;
    Ok(success(stats, "Event statistics retrieved successfully"))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let registration = state
        .service
        .confirm_payment(&principal, id(path)?)
        .await?;
    Ok(success(registration, "Payment confirmed"))
}
