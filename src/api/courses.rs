use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document};
use serde::{Deserialize, Deserializer};
use validator::Validate;

use crate::api::bootcamps::{clean, trimmed, PUBLISHERS};
use crate::api::extract::{parse_id, ApiJson};
use crate::api::response::ApiResponse;
use crate::app::AppState;
use crate::auth::middleware::AuthUser;
use crate::auth::models::AuthenticatedUser;
use crate::auth::policy::{ensure_owner, require_role};
use crate::db::bootcamp_repository::BootcampRepository;
use crate::db::course_repository::{CourseRepository, QUERY_SCHEMA};
use crate::db::json::document_to_json;
use crate::db::models::{Course, MinimumSkill};
use crate::db::query::ListQuery;
use crate::error::AppError;
use crate::services::rollup;

/// `weeks` arrives as `"8"` or `8`; it is stored as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Weeks {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Weeks>::deserialize(deserializer)?.map(|w| match w {
        Weeks::Text(s) => s,
        Weeks::Number(n) => n.to_string(),
    }))
}

/// Body of `POST /bootcamps/{bootcampId}/courses`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    #[validate(required(message = "Please add a course title"))]
    pub title: Option<String>,
    #[validate(required(message = "Please add a description"))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    #[validate(required(message = "Please add number of weeks"))]
    pub weeks: Option<String>,
    #[validate(
        required(message = "Please add tuition cost"),
        range(min = 0.0, message = "Tuition can not be negative")
    )]
    pub tuition: Option<f64>,
    #[validate(required(message = "Please add a minimum skill"))]
    pub minimum_skill: Option<MinimumSkill>,
    pub scholarship_available: Option<bool>,
}

/// Body of `PUT /courses/{id}`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, message = "Please add a course title"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Please add a description"))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    #[validate(length(min = 1, message = "Please add number of weeks"))]
    pub weeks: Option<String>,
    #[validate(range(min = 0.0, message = "Tuition can not be negative"))]
    pub tuition: Option<f64>,
    pub minimum_skill: Option<MinimumSkill>,
    pub scholarship_available: Option<bool>,
}

impl UpdateCourseRequest {
    fn normalized(self) -> Self {
        Self {
            title: trimmed(self.title),
            description: trimmed(self.description),
            weeks: trimmed(self.weeks),
            ..self
        }
    }

    fn into_update(self) -> Result<Document, AppError> {
        let mut set = Document::new();
        if let Some(title) = self.title {
            set.insert("title", title);
        }
        if let Some(description) = self.description {
            set.insert("description", description);
        }
        if let Some(weeks) = self.weeks {
            set.insert("weeks", weeks);
        }
        if let Some(tuition) = self.tuition {
            set.insert("tuition", tuition);
        }
        if let Some(skill) = self.minimum_skill {
            set.insert("minimumSkill", mongodb::bson::to_bson(&skill)?);
        }
        if let Some(scholarship) = self.scholarship_available {
            set.insert("scholarshipAvailable", scholarship);
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        Ok(update)
    }
}

fn course_not_found(id: &ObjectId) -> AppError {
    AppError::NotFound(format!("No course with the id of {id}"))
}

fn no_bootcamp(id: &ObjectId) -> AppError {
    AppError::NotFound(format!("No bootcamp with the id of {id}"))
}

/// Add a course to a bootcamp owned by the actor (or any bootcamp for admins).
pub async fn process_create_course(
    bootcamps: &dyn BootcampRepository,
    courses: &dyn CourseRepository,
    actor: &AuthenticatedUser,
    bootcamp_id: ObjectId,
    request: CreateCourseRequest,
) -> Result<Course, AppError> {
    require_role(actor, PUBLISHERS)?;

    let bootcamp = bootcamps
        .find_by_id(&bootcamp_id)
        .await?
        .ok_or_else(|| no_bootcamp(&bootcamp_id))?;
    ensure_owner(actor, &bootcamp.user, "add a course to", "bootcamp", &bootcamp_id)?;

    let request = CreateCourseRequest {
        title: clean(request.title),
        description: clean(request.description),
        weeks: clean(request.weeks),
        ..request
    };
    request.validate()?;

    let (Some(title), Some(description), Some(weeks), Some(tuition), Some(minimum_skill)) = (
        request.title,
        request.description,
        request.weeks,
        request.tuition,
        request.minimum_skill,
    ) else {
        return Err(AppError::Internal("Validated course is missing fields".into()));
    };

    let course = Course {
        id: ObjectId::new(),
        title,
        description,
        weeks,
        tuition,
        minimum_skill,
        scholarship_available: request.scholarship_available.unwrap_or(false),
        bootcamp: bootcamp_id,
        user: actor.id,
        created_at: DateTime::now(),
    };

    courses.insert(&course).await?;
    rollup::refresh_average_cost(bootcamps, courses, &bootcamp_id).await;

    Ok(course)
}

pub async fn process_update_course(
    bootcamps: &dyn BootcampRepository,
    courses: &dyn CourseRepository,
    actor: &AuthenticatedUser,
    id: ObjectId,
    request: UpdateCourseRequest,
) -> Result<Course, AppError> {
    require_role(actor, PUBLISHERS)?;

    let current = courses
        .find_by_id(&id)
        .await?
        .ok_or_else(|| course_not_found(&id))?;
    ensure_owner(actor, &current.user, "update", "course", &id)?;

    let request = request.normalized();
    request.validate()?;
    let update = request.into_update()?;
    if update.is_empty() {
        return Ok(current);
    }

    let course = courses
        .update(&id, update)
        .await?
        .ok_or_else(|| course_not_found(&id))?;
    rollup::refresh_average_cost(bootcamps, courses, &course.bootcamp).await;

    Ok(course)
}

pub async fn process_delete_course(
    bootcamps: &dyn BootcampRepository,
    courses: &dyn CourseRepository,
    actor: &AuthenticatedUser,
    id: ObjectId,
) -> Result<(), AppError> {
    require_role(actor, PUBLISHERS)?;

    let current = courses
        .find_by_id(&id)
        .await?
        .ok_or_else(|| course_not_found(&id))?;
    ensure_owner(actor, &current.user, "delete", "course", &id)?;

    courses.delete(&id).await?;
    rollup::refresh_average_cost(bootcamps, courses, &current.bootcamp).await;

    Ok(())
}

/// `GET /api/v1/courses`
pub async fn list_courses_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ApiResponse>, AppError> {
    let query = ListQuery::parse(query.as_deref(), &QUERY_SCHEMA)?;
    let page = state
        .course_repo
        .list(&query, state.settings.pagination_count_basis)
        .await?;
    Ok(Json(ApiResponse::page(page)))
}

/// `GET /api/v1/bootcamps/{bootcampId}/courses`
pub async fn bootcamp_courses_handler(
    State(state): State<AppState>,
    Path(bootcamp_id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let bootcamp_id = parse_id(&bootcamp_id)?;
    let courses = state.course_repo.find_by_bootcamp(&bootcamp_id).await?;
    Ok(Json(ApiResponse::list(&courses)?))
}

/// `GET /api/v1/courses/{id}`
pub async fn get_course_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let id = parse_id(&id)?;
    let course = state
        .course_repo
        .find_joined(&id)
        .await?
        .ok_or_else(|| course_not_found(&id))?;
    Ok(Json(ApiResponse::data(document_to_json(course))))
}

/// `POST /api/v1/bootcamps/{bootcampId}/courses`
pub async fn create_course_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(bootcamp_id): Path<String>,
    ApiJson(request): ApiJson<CreateCourseRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), AppError> {
    let course = process_create_course(
        state.bootcamp_repo.as_ref(),
        state.course_repo.as_ref(),
        &actor,
        parse_id(&bootcamp_id)?,
        request,
    )
    .await?;
    Ok(ApiResponse::model(&course)?.created())
}

/// `PUT /api/v1/courses/{id}`
pub async fn update_course_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateCourseRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let course = process_update_course(
        state.bootcamp_repo.as_ref(),
        state.course_repo.as_ref(),
        &actor,
        parse_id(&id)?,
        request,
    )
    .await?;
    Ok(Json(ApiResponse::model(&course)?))
}

/// `DELETE /api/v1/courses/{id}`
pub async fn delete_course_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    process_delete_course(
        state.bootcamp_repo.as_ref(),
        state.course_repo.as_ref(),
        &actor,
        parse_id(&id)?,
    )
    .await?;
    Ok(Json(ApiResponse::empty()))
}
