use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use super::{body, id, query, AppState};
use crate::models::{EventFilter, EventStatus, EventUpdate, NewEvent, Principal};
use crate::services::{Decision, DecisionRequest};
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, list, success};

pub async fn list_events(
    State(state): State<AppState>,
    principal: Principal,
    filter: Result<Query<EventFilter>, QueryRejection>,
) -> Result<Response, AppError> {
    let events = state
        .service
        .list_events(&principal, query(filter)?)
        .await?;
    let views = state.service.describe_all(&principal, events).await?;
    Ok(list(views, "No events found."))
}

pub async fn create_event(
    State(state): State<AppState>,
    principal: Principal,
    payload: Result<Json<NewEvent>, JsonRejection>,
) -> Result<Response, AppError> {
    let event = state
        .service
        .create_event(&principal, body(payload)?)
        .await?;
    let message = if event.status == EventStatus::Approved {
        "Class event created and approved"
    } else {
        "Event submitted for approval"
    };
    let view = state.service.describe(&principal, event).await?;
    Ok(created(view, message))
}

pub async fn get_event(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let event = state.service.get_event(&principal, id(path)?).await?;
    let view = state.service.describe(&principal, event).await?;
    Ok(success(view, "Event retrieved successfully"))
}

pub async fn update_event(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<EventUpdate>, JsonRejection>,
) -> Result<Response, AppError> {
    let event = state
        .service
        .update_event(&principal, id(path)?, body(payload)?)
        .await?;
    Ok(success(event, "Event updated successfully"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    state.service.delete_event(&principal, id(path)?).await?;
    Ok(empty_success("Event deleted successfully"))
}

pub async fn decide(
    State(state): State<AppState>,
    principal: Principal,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let event_id = id(path)?;
    let decision = Decision::try_from(body(payload)?)?;
    let event = state.service.decide(&principal, event_id, decision).await?;
    let message = format!("Event {} successfully", event.status);
    Ok(success(event, message))
}

pub async fn pending_events(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, AppError> {
    let events = state.service.pending_events(&principal).await?;
    Ok(list(events, "No pending events."))
}

pub async fn cancelled_events(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, AppError> {
    let events = state.service.cancelled_events(&principal).await?;
    Ok(list(events, "No cancelled events."))
}

pub async fn completed_events(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Response, AppError> {
    let events = state.service.completed_events().await?;
    Ok(list(events, "No completed events."))
}

pub async fn my_events(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, AppError> {
    let events = state.service.my_events(&principal).await?;
    let message = if events.is_empty() {
        "You have no events yet.".to_string()
    } else {
        format!("{} item(s)", events.len())
    };
    Ok(success(events, message))
}

pub async fn list_conflicts(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, AppError> {
    let conflicts = state.service.list_conflicts(&principal).await?;
    Ok(list(conflicts, "No conflicts detected."))
}
