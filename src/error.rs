use axum::http::StatusCode;
use thiserror::Error;

/// Message used for every malformed or unknown resource id.
pub const RESOURCE_NOT_FOUND: &str = "Resource not found";

/// Message used for every unique-index violation.
pub const DUPLICATE_FIELD: &str = "Duplicate field value entered";

/// Application-wide error types.
///
/// Every handler returns `Result<_, AppError>`; the `IntoResponse` impl in
/// `api::errors` is the only place an error becomes an HTTP response.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Geocoder error: {0}")]
    Geocoder(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// One message per failed field constraint.
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status carried by this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Geocoder(_)
            | AppError::Mail(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Infrastructure faults never leak their details.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Auth(msg)
            | AppError::Forbidden(msg) => msg.clone(),
            AppError::Validation(messages) => messages.join(", "),
            AppError::Mail(_) => "Email could not be sent".to_string(),
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Geocoder(_)
            | AppError::Internal(_) => "Server Error".to_string(),
        }
    }

    pub fn resource_not_found() -> Self {
        AppError::NotFound(RESOURCE_NOT_FOUND.to_string())
    }
}

/// Helper conversion from anyhow::Error
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            AppError::BadRequest(DUPLICATE_FIELD.to_string())
        } else {
            AppError::Database(err.to_string())
        }
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(_: mongodb::bson::oid::Error) -> Self {
        AppError::resource_not_found()
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::Internal(format!("BSON serialization failed: {err}"))
    }
}

impl From<mongodb::bson::de::Error> for AppError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        AppError::Database(format!("BSON deserialization failed: {err}"))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(validation_messages(&errors))
    }
}

/// Flatten field errors into their messages, ordered by field name.
pub fn validation_messages(errors: &validator::ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("Invalid value for {field}"),
            })
        })
        .collect()
}

/// Unique index violations arrive as write errors (inserts/updates) or as
/// command errors (findAndModify).
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    const DUPLICATE_KEY_CODE: i32 = 11000;

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "Please add a name"))]
        name: String,
        #[validate(range(min = 1, max = 10, message = "Rating must be between 1 and 10"))]
        rating: u8,
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::resource_not_found().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Validation(vec!["a".into()]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_infrastructure_details_are_hidden() {
        let err = AppError::Database("connection refused at 10.0.0.3".into());
        assert_eq!(err.public_message(), "Server Error");

        let err = AppError::Mail("smtp timeout".into());
        assert_eq!(err.public_message(), "Email could not be sent");
    }

    #[test]
    fn test_invalid_object_id_maps_to_not_found() {
        let err: AppError = mongodb::bson::oid::ObjectId::parse_str("not-an-id")
            .unwrap_err()
            .into();
        match err {
            AppError::NotFound(msg) => assert_eq!(msg, RESOURCE_NOT_FOUND),
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_validation_errors_are_joined_in_field_order() {
        let probe = Probe {
            name: String::new(),
            rating: 42,
        };
        let err: AppError = probe.validate().unwrap_err().into();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            "Please add a name, Rating must be between 1 and 10"
        );
    }
}
