use axum::extract::FromRequest;
use mongodb::bson::oid::ObjectId;

use crate::error::AppError;

/// `axum::Json` whose rejections render through [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Parse a path id. Malformed ids are reported like missing resources.
pub fn parse_id(raw: &str) -> Result<ObjectId, AppError> {
    Ok(ObjectId::parse_str(raw.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RESOURCE_NOT_FOUND;

    #[test]
    fn test_parse_id() {
        let id = ObjectId::new();
        assert_eq!(parse_id(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn test_malformed_id_is_not_found() {
        match parse_id("5d713995b721c3bb38c1f5d").unwrap_err() {
            AppError::NotFound(msg) => assert_eq!(msg, RESOURCE_NOT_FOUND),
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }
}
