//! The caller arrives pre-authenticated: the gateway in front of the service
//! forwards who they are in `x-user-*` headers.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::models::{Principal, Role};
use crate::utils::error::AppError;

pub const USER_ID: &str = "x-user-id";
pub const USER_NAME: &str = "x-user-name";
pub const USER_ROLE: &str = "x-user-role";
pub const USER_EMAIL: &str = "x-user-email";
pub const USER_PHONE: &str = "x-user-phone";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    header(parts, name).ok_or_else(|| AppError::AuthError(format!("Missing {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = required(parts, USER_ID)?
            .parse::<Uuid>()
            .map_err(|_| AppError::AuthError(format!("Invalid {} header", USER_ID)))?;
        let username = required(parts, USER_NAME)?;
        let role: Role = required(parts, USER_ROLE)?.parse()?;

        Ok(Principal::new(id, username, role).with_contact(
            header(parts, USER_EMAIL).map(str::to_string),
            header(parts, USER_PHONE).map(str::to_string),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Principal, AppError> {
        let (mut parts, _) = request.into_parts();
        Principal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_principal_from_headers() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(USER_ID, id.to_string())
            .header(USER_NAME, "asha")
            .header(USER_ROLE, "student")
            .header(USER_EMAIL, "asha@college.edu")
            .body(())
            .unwrap();

        let principal = extract(request).await.unwrap();
        assert_eq!(principal.id, id);
        assert_eq!(principal.role, Role::Student);
        assert_eq!(principal.email.as_deref(), Some("asha@college.edu"));
        assert_eq!(principal.phone, None);
    }

    #[tokio::test]
    async fn test_missing_or_bad_headers_are_auth_errors() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(AppError::AuthError(_))));

        let bad_role = Request::builder()
            .header(USER_ID, Uuid::new_v4().to_string())
            .header(USER_NAME, "x")
            .header(USER_ROLE, "janitor")
            .body(())
            .unwrap();
        assert!(matches!(extract(bad_role).await, Err(AppError::AuthError(_))));

        let bad_id = Request::builder()
            .header(USER_ID, "42")
            .header(USER_NAME, "x")
            .header(USER_ROLE, "admin")
            .body(())
            .unwrap();
        assert!(matches!(extract(bad_id).await, Err(AppError::AuthError(_))));
    }
}
