use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{events, health_check, registrations, AppState};

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/pending", get(events::pending_events))
        .route("/events/cancelled", get(events::cancelled_events))
        .route("/events/completed", get(events::completed_events))
        .route("/events/mine", get(events::my_events))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/decision", post(events::decide))
        .route("/events/:id/register", post(registrations::register))
        .route(
            "/events/:id/cancel-registration",
            post(registrations::cancel_registration),
        )
        .route("/events/:id/attendance", post(registrations::mark_attendance))
        .route("/events/:id/feedback", post(registrations::submit_feedback))
        .route("/events/:id/statistics", get(registrations::statistics))
        .route(
            "/registrations/:id/confirm-payment",
            post(registrations::confirm_payment),
        )
        .route("/conflicts", get(events::list_conflicts))
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config))
        .layer(create_cors_layer(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::handlers::principal::{USER_EMAIL, USER_ID, USER_NAME, USER_ROLE};
    use crate::models::event::tests::at;
    use crate::models::ExternalRecord;
    use crate::services::notification::{MemoryNotifier, Templates};
    use crate::services::EventService;
    use crate::store::{InMemoryDirectory, InMemoryStore};
    use crate::utils::clock::FixedClock;

    struct Caller {
        id: Uuid,
        name: &'static str,
        role: &'static str,
    }

    impl Caller {
        fn new(name: &'static str, role: &'static str) -> Self {
            Self {
                id: Uuid::new_v4(),
                name,
                role,
            }
        }

        fn request(&self, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
            let builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(USER_ID, self.id.to_string())
                .header(USER_NAME, self.name)
                .header(USER_ROLE, self.role)
                .header(USER_EMAIL, format!("{}@college.edu", self.name));
            match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            }
        }
    }

    async fn app() -> (Router, Arc<InMemoryDirectory>, Arc<FixedClock>) {
        let directory = Arc::new(InMemoryDirectory::new());
        let clock = Arc::new(FixedClock::new(at(1)));
        let service = EventService::new(
            Arc::new(InMemoryStore::new()),
            directory.clone(),
            Arc::new(MemoryNotifier::new()),
            clock.clone(),
            Templates::new("http://localhost:3001"),
        );
        let config = Config::from_lookup(|_| None);
        (
            create_routes(AppState::new(service), &config),
            directory,
            clock,
        )
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn college_event(venue: &str) -> Value {
        json!({
            "title": "Tech Fest",
            "level": "college",
            "type": "technical",
            "venue": venue,
            "start_date": "2025-03-10T10:00:00Z",
            "end_date": "2025-03-10T12:00:00Z",
            "registration_deadline": "2025-03-10T09:00:00Z",
            "max_participants": 100
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _, _) = app().await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, _, _) = app().await;
        let request = Request::builder()
            .uri("/api/v1/events")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "AUTH_ERROR");
    }

    #[tokio::test]
    async fn test_create_approve_register_flow() {
        let (app, directory, clock) = app().await;
        let dept = Caller::new("it-dept", "department");
        let chief = Caller::new("chief", "campus-chief");
        let student = Caller::new("asha", "student");
        directory
            .insert(ExternalRecord {
                username: "asha".into(),
                email: Some("asha@college.edu".into()),
                phone: None,
            })
            .await;

        let (status, body) = send(
            &app,
            dept.request("POST", "/api/v1/events", Some(college_event("Main Hall"))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending");
        let event_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, student.request("GET", "/api/v1/events", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "No events found.");

        let (status, _) = send(
            &app,
            student.request(
                "POST",
                &format!("/api/v1/events/{}/decision", event_id),
                Some(json!({ "status": "approved" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            chief.request(
                "POST",
                &format!("/api/v1/events/{}/decision", event_id),
                Some(json!({ "status": "rejected" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            chief.request(
                "POST",
                &format!("/api/v1/events/{}/decision", event_id),
                Some(json!({ "status": "approved" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "approved");

        let (status, body) = send(
            &app,
            student.request("POST", &format!("/api/v1/events/{}/register", event_id), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "confirmed");

        let (status, body) = send(
            &app,
            student.request("POST", &format!("/api/v1/events/{}/register", event_id), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "DUPLICATE_REGISTRATION");

        let (status, body) = send(&app, student.request("GET", "/api/v1/events/mine", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["registration_status"], "confirmed");
        assert_eq!(body["data"][0]["title"], "Tech Fest");

        let detail = format!("/api/v1/events/{}", event_id);
        let (status, body) = send(&app, student.request("GET", &detail, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["registered_count"], 1);
        assert_eq!(body["data"]["available_slots"], 99);
        assert_eq!(body["data"]["is_registration_open"], true);
        assert!(body["data"].get("attendance_code").is_none());

        let (_, body) = send(&app, dept.request("GET", &detail, None)).await;
        let code = body["data"]["attendance_code"].as_str().unwrap().to_string();

        clock.set(at(11));
        let attendance = format!("/api/v1/events/{}/attendance", event_id);
        let (status, body) = send(
            &app,
            student.request("POST", &attendance, Some(json!({ "code": "not-the-code" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            student.request("POST", &attendance, Some(json!({ "code": code }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["attended"], true);
    }

    #[tokio::test]
    async fn test_conflicting_approval_is_409() {
        let (app, _, _) = app().await;
        let dept = Caller::new("it-dept", "department");
        let chief = Caller::new("chief", "campus-chief");

        let mut ids = Vec::new();
        for _ in 0..2 {
            let (_, body) = send(
                &app,
                dept.request("POST", "/api/v1/events", Some(college_event("Main Hall"))),
            )
            .await;
            ids.push(body["data"]["id"].as_str().unwrap().to_string());
        }

        let decision = Some(json!({ "status": "approved" }));
        let (status, _) = send(
            &app,
            chief.request("POST", &format!("/api/v1/events/{}/decision", ids[0]), decision.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            chief.request("POST", &format!("/api/v1/events/{}/decision", ids[1]), decision),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SCHEDULE_CONFLICT");

        let (status, body) = send(&app, chief.request("GET", "/api/v1/conflicts", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_payloads_use_the_error_envelope() {
        let (app, _, _) = app().await;
        let dept = Caller::new("it-dept", "department");

        let (status, body) = send(
            &app,
            dept.request("POST", "/api/v1/events", Some(json!({ "title": "x" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(&app, dept.request("GET", "/api/v1/events/not-a-uuid", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            dept.request("GET", &format!("/api/v1/events/{}", Uuid::new_v4()), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
