use async_trait::async_trait;

use crate::models::{ExternalRecord, Principal};
use crate::utils::error::AppError;

/// The college's authoritative student directory.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn lookup(&self, username: &str) -> Result<Option<ExternalRecord>, AppError>;
}

/// Refuses with [`AppError::IdentityMismatch`] unless the principal's email or
/// phone agrees with the directory. A missing record is a refusal too.
pub async fn verify(directory: &dyn IdentityDirectory, principal: &Principal) -> Result<(), AppError> {
    let record = directory.lookup(&principal.username).await.map_err(|e| match e {
        AppError::DatabaseError(_) | AppError::ExternalServiceError(_) => e,
        other => AppError::ExternalServiceError(other.to_string()),
    })?;

    let Some(record) = record else {
        return Err(AppError::IdentityMismatch(
            "Your username does not exist in the college database. Registration denied."
                .to_string(),
        ));
    };

    if !record.matches(principal) {
        return Err(AppError::IdentityMismatch(
            "Your email or phone number does not match the college database. Registration denied."
                .to_string(),
        ));
    }
    Ok(())
}
