use thiserror::Error;

use crate::users::repo::StoreError;

pub const USER_NOT_FOUND: &str = "User not found";
pub const USER_ALREADY_EXISTS: &str = "User already exist";
pub const INVALID_CREDENTIALS: &str = "email or password is invalid";

/// Failures a credential operation can end in.
///
/// `NotFound` is the only kind produced on purpose (absent record, duplicate
/// email, bad credentials). Everything else is a fault that is reported with
/// whatever status it carries, or 500 when it carries none.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl ServiceError {
    /// Status carried by the failure itself, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::NotFound(_) => Some(404),
            ServiceError::BadRequest(_) => Some(400),
            ServiceError::Store(e) => e.status(),
            ServiceError::Fault(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_404_and_message() {
        let err = ServiceError::NotFound(USER_NOT_FOUND);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "User not found");
    }

    #[test]
    fn conflict_from_store_keeps_its_status() {
        let err = ServiceError::from(StoreError::Conflict("email taken".into()));
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn opaque_fault_has_no_status() {
        let err = ServiceError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "boom");
    }
}
