use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::db::json::document_to_json;
use crate::db::query::{ListPage, Pagination};
use crate::error::AppError;

/// Success envelope shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ApiResponse {
    fn success() -> Self {
        Self {
            success: true,
            count: None,
            pagination: None,
            data: None,
            token: None,
        }
    }

    /// `{ success, data }`
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success()
        }
    }

    /// `{ success, data }` for any model.
    pub fn model<T: Serialize>(model: &T) -> Result<Self, AppError> {
        Ok(Self::data(crate::db::json::to_api_json(model)?))
    }

    /// `{ success, count, data: [...] }`
    pub fn list<T: Serialize>(items: &[T]) -> Result<Self, AppError> {
        let data = items
            .iter()
            .map(crate::db::json::to_api_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            count: Some(data.len()),
            data: Some(Value::Array(data)),
            ..Self::success()
        })
    }

    /// `{ success, count, pagination, data: [...] }`
    pub fn page(page: ListPage) -> Self {
        let count = page.count();
        let data = page.data.into_iter().map(document_to_json).collect();
        Self {
            count: Some(count),
            pagination: Some(page.pagination),
            data: Some(Value::Array(data)),
            ..Self::success()
        }
    }

    /// `{ success, data: {} }`
    pub fn empty() -> Self {
        Self::data(Value::Object(Default::default()))
    }

    /// `{ success, token }`
    pub fn token(token: String) -> Self {
        Self {
            token: Some(token),
            ..Self::success()
        }
    }

    /// `{ success, data: "<message>" }`
    pub fn message(message: impl Into<String>) -> Self {
        Self::data(Value::String(message.into()))
    }

    pub fn ok(self) -> (StatusCode, Json<Self>) {
        (StatusCode::OK, Json(self))
    }

    pub fn created(self) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Json(self))
    }
}
