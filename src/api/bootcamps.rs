use std::borrow::Cow;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::api::extract::{parse_id, ApiJson};
use crate::api::response::ApiResponse;
use crate::app::AppState;
use crate::auth::middleware::AuthUser;
use crate::auth::models::{AuthenticatedUser, Role};
use crate::auth::policy::{ensure_owner, require_role};
use crate::db::bootcamp_repository::{BootcampRepository, QUERY_SCHEMA};
use crate::db::course_repository::CourseRepository;
use crate::db::models::{Bootcamp, Career, DEFAULT_PHOTO};
use crate::db::query::ListQuery;
use crate::db::review_repository::ReviewRepository;
use crate::error::AppError;
use crate::geocoder::client::Geocoder;
use crate::services::{cascade, geo, slug::slugify};

/// Roles allowed to publish and manage bootcamps.
pub const PUBLISHERS: &[Role] = &[Role::Publisher, Role::Admin];

/// Accepts only absolute http(s) URLs.
pub fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
        _ => {
            let mut err = ValidationError::new("url");
            err.message = Some(Cow::from("Please use a valid URL with HTTP or HTTPS"));
            Err(err)
        }
    }
}

/// Trimmed value, `None` when blank.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trimmed value; blank stays present so validation rejects it.
pub(crate) fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Error for a submitted but empty value.
pub(crate) fn blank(message: &'static str) -> ValidationError {
    let mut err = ValidationError::new("blank");
    err.message = Some(Cow::from(message));
    err
}

fn require_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(blank("Please add a name"));
    }
    Ok(())
}

fn require_description(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(blank("Please add a description"));
    }
    Ok(())
}

/// Body of `POST /bootcamps`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBootcampRequest {
    #[validate(
        required(message = "Please add a name"),
        length(max = 50, message = "Name can not be more than 50 characters")
    )]
    pub name: Option<String>,
    #[validate(
        required(message = "Please add a description"),
        length(max = 500, message = "Description can not be more than 500 characters")
    )]
    pub description: Option<String>,
    #[validate(custom(function = "validate_http_url"))]
    pub website: Option<String>,
    #[validate(length(max = 20, message = "Phone number can not be longer than 20 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Please add a valid email"))]
    pub email: Option<String>,
    #[validate(required(message = "Please add an address"))]
    pub address: Option<String>,
    #[validate(
        required(message = "Please add at least one career"),
        length(min = 1, message = "Please add at least one career")
    )]
    pub careers: Option<Vec<Career>>,
    pub housing: Option<bool>,
    pub job_assistance: Option<bool>,
    pub job_guarantee: Option<bool>,
    pub accept_gi: Option<bool>,
}

impl CreateBootcampRequest {
    fn normalized(self) -> Self {
        Self {
            name: clean(self.name),
            description: clean(self.description),
            website: clean(self.website),
            phone: clean(self.phone),
            email: clean(self.email),
            address: clean(self.address),
            ..self
        }
    }
}

/// Body of `PUT /bootcamps/{id}`; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBootcampRequest {
    #[validate(
        custom(function = "require_name"),
        length(max = 50, message = "Name can not be more than 50 characters")
    )]
    pub name: Option<String>,
    #[validate(
        custom(function = "require_description"),
        length(max = 500, message = "Description can not be more than 500 characters")
    )]
    pub description: Option<String>,
    #[validate(custom(function = "validate_http_url"))]
    pub website: Option<String>,
    #[validate(length(max = 20, message = "Phone number can not be longer than 20 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Please add a valid email"))]
    pub email: Option<String>,
    pub address: Option<String>,
    #[validate(length(min = 1, message = "Please add at least one career"))]
    pub careers: Option<Vec<Career>>,
    pub housing: Option<bool>,
    pub job_assistance: Option<bool>,
    pub job_guarantee: Option<bool>,
    pub accept_gi: Option<bool>,
}

impl UpdateBootcampRequest {
    fn normalized(self) -> Self {
        Self {
            name: trimmed(self.name),
            description: trimmed(self.description),
            website: clean(self.website),
            phone: clean(self.phone),
            email: clean(self.email),
            ..self
        }
    }

    /// `$set` / `$unset` document for the submitted fields.
    async fn into_update(self, geocoder: &dyn Geocoder) -> Result<Document, AppError> {
        let mut set = Document::new();
        let mut unset = Document::new();

        if let Some(name) = self.name {
            set.insert("slug", slugify(&name));
            set.insert("name", name);
        }
        if let Some(description) = self.description {
            set.insert("description", description);
        }
        if let Some(website) = self.website {
            set.insert("website", website);
        }
        if let Some(phone) = self.phone {
            set.insert("phone", phone);
        }
        if let Some(email) = self.email {
            set.insert("email", email);
        }
        if let Some(address) = clean(self.address) {
            let location = geo::locate(geocoder, &address).await?;
            set.insert("location", mongodb::bson::to_bson(&location)?);
            unset.insert("address", "");
        }
        if let Some(careers) = self.careers {
            set.insert("careers", mongodb::bson::to_bson(&careers)?);
        }
        for (field, value) in [
            ("housing", self.housing),
            ("jobAssistance", self.job_assistance),
            ("jobGuarantee", self.job_guarantee),
            ("acceptGi", self.accept_gi),
        ] {
            if let Some(value) = value {
                set.insert(field, value);
            }
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        Ok(update)
    }
}

pub(crate) fn bootcamp_not_found(id: &ObjectId) -> AppError {
    AppError::NotFound(format!("Bootcamp not found with id of {id}"))
}

/// Validate, derive slug and location, enforce one bootcamp per publisher,
/// then insert.
pub async fn process_create_bootcamp(
    bootcamps: &dyn BootcampRepository,
    geocoder: &dyn Geocoder,
    actor: &AuthenticatedUser,
    request: CreateBootcampRequest,
) -> Result<Bootcamp, AppError> {
    require_role(actor, PUBLISHERS)?;

    let request = request.normalized();
    request.validate()?;

    // Check-then-act: two concurrent creates by one publisher can both pass.
    if !actor.is_admin() && bootcamps.count_by_owner(&actor.id).await? > 0 {
        return Err(AppError::BadRequest(format!(
            "The user with ID {} has already published a bootcamp",
            actor.id
        )));
    }

    let (Some(name), Some(description), Some(address), Some(careers)) = (
        request.name,
        request.description,
        request.address,
        request.careers,
    ) else {
        return Err(AppError::Internal("Validated bootcamp is missing fields".into()));
    };

    let location = geo::locate(geocoder, &address).await?;

    let bootcamp = Bootcamp {
        id: ObjectId::new(),
        slug: slugify(&name),
        name,
        description,
        website: request.website,
        phone: request.phone,
        email: request.email,
        address: None,
        location: Some(location),
        careers,
        average_rating: None,
        average_cost: None,
        photo: DEFAULT_PHOTO.to_string(),
        housing: request.housing.unwrap_or(false),
        job_assistance: request.job_assistance.unwrap_or(false),
        job_guarantee: request.job_guarantee.unwrap_or(false),
        accept_gi: request.accept_gi.unwrap_or(false),
        user: actor.id,
        created_at: DateTime::now(),
    };

    bootcamps.insert(&bootcamp).await?;
    tracing::info!(bootcamp = %bootcamp.id, owner = %actor.id, "Bootcamp created");

    Ok(bootcamp)
}

/// Partial update by the owner or an admin.
pub async fn process_update_bootcamp(
    bootcamps: &dyn BootcampRepository,
    geocoder: &dyn Geocoder,
    actor: &AuthenticatedUser,
    id: ObjectId,
    request: UpdateBootcampRequest,
) -> Result<Bootcamp, AppError> {
    require_role(actor, PUBLISHERS)?;

    let current = bootcamps
        .find_by_id(&id)
        .await?
        .ok_or_else(|| bootcamp_not_found(&id))?;
    ensure_owner(actor, &current.user, "update", "bootcamp", &id)?;

    let request = request.normalized();
    request.validate()?;
    let update = request.into_update(geocoder).await?;
    if update.is_empty() {
        return Ok(current);
    }

    bootcamps
        .update(&id, update)
        .await?
        .ok_or_else(|| bootcamp_not_found(&id))
}

/// Delete by the owner or an admin, cascading to courses and reviews.
pub async fn process_delete_bootcamp(
    bootcamps: &dyn BootcampRepository,
    courses: &dyn CourseRepository,
    reviews: &dyn ReviewRepository,
    actor: &AuthenticatedUser,
    id: ObjectId,
) -> Result<(), AppError> {
    require_role(actor, PUBLISHERS)?;

    let current = bootcamps
        .find_by_id(&id)
        .await?
        .ok_or_else(|| bootcamp_not_found(&id))?;
    ensure_owner(actor, &current.user, "delete", "bootcamp", &id)?;

    cascade::delete_bootcamp(bootcamps, courses, reviews, &id).await
}

/// Bootcamps within `distance` miles of `zipcode`.
pub async fn process_bootcamps_in_radius(
    bootcamps: &dyn BootcampRepository,
    geocoder: &dyn Geocoder,
    zipcode: &str,
    distance: &str,
) -> Result<Vec<Bootcamp>, AppError> {
    let distance: f64 = distance
        .trim()
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid distance '{distance}'")))?;

    let location = geo::locate(geocoder, zipcode).await?;
    let (longitude, latitude) = match location.coordinates.as_slice() {
        [lng, lat] => (*lng, *lat),
        _ => return Err(AppError::Geocoder("Geocoder returned no coordinates".into())),
    };

    bootcamps
        .within_radius(longitude, latitude, geo::radius_in_radians(distance))
        .await
}

/// `GET /api/v1/bootcamps`
pub async fn list_bootcamps_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ApiResponse>, AppError> {
    let query = ListQuery::parse(query.as_deref(), &QUERY_SCHEMA)?;
    let page = state
        .bootcamp_repo
        .list(&query, state.settings.pagination_count_basis)
        .await?;
    Ok(Json(ApiResponse::page(page)))
}

/// `GET /api/v1/bootcamps/{id}`
pub async fn get_bootcamp_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let id = parse_id(&id)?;
    let bootcamp = state
        .bootcamp_repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| bootcamp_not_found(&id))?;
    Ok(Json(ApiResponse::model(&bootcamp)?))
}

/// `POST /api/v1/bootcamps`
pub async fn create_bootcamp_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<CreateBootcampRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), AppError> {
    let bootcamp = process_create_bootcamp(
        state.bootcamp_repo.as_ref(),
        state.geocoder.as_ref(),
        &actor,
        request,
    )
    .await?;
    Ok(ApiResponse::model(&bootcamp)?.created())
}

/// `PUT /api/v1/bootcamps/{id}`
pub async fn update_bootcamp_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateBootcampRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let bootcamp = process_update_bootcamp(
        state.bootcamp_repo.as_ref(),
        state.geocoder.as_ref(),
        &actor,
        parse_id(&id)?,
        request,
    )
    .await?;
    Ok(Json(ApiResponse::model(&bootcamp)?))
}

/// `DELETE /api/v1/bootcamps/{id}`
pub async fn delete_bootcamp_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    process_delete_bootcamp(
        state.bootcamp_repo.as_ref(),
        state.course_repo.as_ref(),
        state.review_repo.as_ref(),
        &actor,
        parse_id(&id)?,
    )
    .await?;
    Ok(Json(ApiResponse::empty()))
}

/// `GET /api/v1/bootcamps/radius/{zipcode}/{distance}`
pub async fn bootcamps_in_radius_handler(
    State(state): State<AppState>,
    Path((zipcode, distance)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, AppError> {
    let found = process_bootcamps_in_radius(
        state.bootcamp_repo.as_ref(),
        state.geocoder.as_ref(),
        &zipcode,
        &distance,
    )
    .await?;
    Ok(Json(ApiResponse::list(&found)?))
}
