use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document};
use serde::Deserialize;
use validator::Validate;

use crate::api::bootcamps::clean;
use crate::api::extract::{parse_id, ApiJson};
use crate::api::response::ApiResponse;
use crate::app::AppState;
use crate::auth::middleware::AuthUser;
use crate::auth::models::{AuthenticatedUser, Role};
use crate::auth::password::hash_password;
use crate::auth::policy::require_role;
use crate::db::models::User;
use crate::db::query::ListQuery;
use crate::db::user_repository::{UserRepository, QUERY_SCHEMA};
use crate::error::AppError;

const ADMINS: &[Role] = &[Role::Admin];

/// Body of `POST /users`. Admins may assign any role.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(required(message = "Please add a name"))]
    pub name: Option<String>,
    #[validate(
        required(message = "Please add an email"),
        email(message = "Please add a valid email")
    )]
    pub email: Option<String>,
    #[validate(
        required(message = "Please add a password"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// Body of `PUT /users/{id}`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, message = "Please add a name"))]
    pub name: Option<String>,
    #[validate(email(message = "Please add a valid email"))]
    pub email: Option<String>,
    pub role: Option<Role>,
}

impl UpdateUserRequest {
    pub(crate) fn into_update(self) -> Result<Document, AppError> {
        let mut set = Document::new();
        if let Some(name) = clean(self.name) {
            set.insert("name", name);
        }
        if let Some(email) = clean(self.email) {
            set.insert("email", email);
        }
        if let Some(role) = self.role {
            set.insert("role", mongodb::bson::to_bson(&role)?);
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        Ok(update)
    }
}

fn user_not_found(id: &ObjectId) -> AppError {
    AppError::NotFound(format!("No user with the id of {id}"))
}

/// Validate and store a new account, returning it without secrets.
pub(crate) async fn insert_user(
    users: &dyn UserRepository,
    request: CreateUserRequest,
) -> Result<User, AppError> {
    let request = CreateUserRequest {
        name: clean(request.name),
        email: clean(request.email),
        ..request
    };
    request.validate()?;

    let (Some(name), Some(email), Some(password)) = (request.name, request.email, request.password)
    else {
        return Err(AppError::Internal("Validated user is missing fields".into()));
    };

    let user = User {
        id: ObjectId::new(),
        name,
        email,
        role: request.role.unwrap_or_default(),
        password: Some(hash_password(&password)?),
        reset_password_token: None,
        reset_password_expire: None,
        created_at: DateTime::now(),
    };

    users.insert(&user).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "Created user");

    Ok(user.redacted())
}

pub async fn process_create_user(
    users: &dyn UserRepository,
    actor: &AuthenticatedUser,
    request: CreateUserRequest,
) -> Result<User, AppError> {
    require_role(actor, ADMINS)?;
    insert_user(users, request).await
}

pub async fn process_update_user(
    users: &dyn UserRepository,
    actor: &AuthenticatedUser,
    id: ObjectId,
    request: UpdateUserRequest,
) -> Result<User, AppError> {
    require_role(actor, ADMINS)?;
    request.validate()?;

    let update = request.into_update()?;
    if update.is_empty() {
        return users
            .find_by_id(&id)
            .await?
            .ok_or_else(|| user_not_found(&id));
    }

    users
        .update(&id, update)
        .await?
        .ok_or_else(|| user_not_found(&id))
}

pub async fn process_delete_user(
    users: &dyn UserRepository,
    actor: &AuthenticatedUser,
    id: ObjectId,
) -> Result<(), AppError> {
    require_role(actor, ADMINS)?;

    users
        .find_by_id(&id)
        .await?
        .ok_or_else(|| user_not_found(&id))?;
    users.delete(&id).await
}

/// `GET /api/v1/users`
pub async fn list_users_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    RawQuery(query): RawQuery,
) -> Result<Json<ApiResponse>, AppError> {
    require_role(&actor, ADMINS)?;
    let query = ListQuery::parse(query.as_deref(), &QUERY_SCHEMA)?;
    let page = state
        .user_repo
        .list(&query, state.settings.pagination_count_basis)
        .await?;
    Ok(Json(ApiResponse::page(page)))
}

/// `GET /api/v1/users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    require_role(&actor, ADMINS)?;
    let id = parse_id(&id)?;
    let user = state
        .user_repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| user_not_found(&id))?;
    Ok(Json(ApiResponse::model(&user)?))
}

/// `POST /api/v1/users`
pub async fn create_user_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), AppError> {
    let user = process_create_user(state.user_repo.as_ref(), &actor, request).await?;
    Ok(ApiResponse::model(&user)?.created())
}

/// `PUT /api/v1/users/{id}`
pub async fn update_user_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let user =
        process_update_user(state.user_repo.as_ref(), &actor, parse_id(&id)?, request).await?;
    Ok(Json(ApiResponse::model(&user)?))
}

/// `DELETE /api/v1/users/{id}`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    process_delete_user(state.user_repo.as_ref(), &actor, parse_id(&id)?).await?;
    Ok(Json(ApiResponse::empty()))
}
