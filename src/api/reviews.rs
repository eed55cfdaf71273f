use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::api::bootcamps::{blank, clean, trimmed};
use crate::api::extract::{parse_id, ApiJson};
use crate::api::response::ApiResponse;
use crate::app::AppState;
use crate::auth::middleware::AuthUser;
use crate::auth::models::{AuthenticatedUser, Role};
use crate::auth::policy::{ensure_owner, require_role};
use crate::db::bootcamp_repository::BootcampRepository;
use crate::db::json::document_to_json;
use crate::db::models::Review;
use crate::db::query::ListQuery;
use crate::db::review_repository::{ReviewRepository, QUERY_SCHEMA};
use crate::error::AppError;
use crate::services::rollup;

/// Roles allowed to write reviews.
pub const REVIEWERS: &[Role] = &[Role::User, Role::Admin];

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(
        required(message = "Please add a title for the review"),
        length(max = 100, message = "Title can not be more than 100 characters")
    )]
    pub title: Option<String>,
    #[validate(required(message = "Please add some text"))]
    pub text: Option<String>,
    #[validate(
        required(message = "Please add a rating between 1 and 10"),
        range(min = 1, max = 10, message = "Please add a rating between 1 and 10")
    )]
    pub rating: Option<i32>,
}

fn require_title(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(blank("Please add a title for the review"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(
        custom(function = "require_title"),
        length(max = 100, message = "Title can not be more than 100 characters")
    )]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Please add some text"))]
    pub text: Option<String>,
    #[validate(range(min = 1, max = 10, message = "Please add a rating between 1 and 10"))]
    pub rating: Option<i32>,
}

impl UpdateReviewRequest {
    fn normalized(self) -> Self {
        Self {
            title: trimmed(self.title),
            text: trimmed(self.text),
            ..self
        }
    }

    fn into_update(self) -> Document {
        let mut set = Document::new();
        if let Some(title) = self.title {
            set.insert("title", title);
        }
        if let Some(text) = self.text {
            set.insert("text", text);
        }
        if let Some(rating) = self.rating {
            set.insert("rating", rating);
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        update
    }
}

fn review_not_found(id: &ObjectId) -> AppError {
    AppError::NotFound(format!("No review found with the id of {id}"))
}

/// Add the actor's review of a bootcamp. A second review by the same user
/// hits the unique `(bootcamp, user)` index and fails with 400.
pub async fn process_create_review(
    bootcamps: &dyn BootcampRepository,
    reviews: &dyn ReviewRepository,
    actor: &AuthenticatedUser,
    bootcamp_id: ObjectId,
    request: CreateReviewRequest,
) -> Result<Review, AppError> {
    require_role(actor, REVIEWERS)?;

    bootcamps
        .find_by_id(&bootcamp_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No bootcamp with the id of {bootcamp_id}")))?;

    let request = CreateReviewRequest {
        title: clean(request.title),
        text: clean(request.text),
        ..request
    };
    request.validate()?;

    let (Some(title), Some(text), Some(rating)) = (request.title, request.text, request.rating)
    else {
        return Err(AppError::Internal("Validated review is missing fields".into()));
    };

    let review = Review {
        id: ObjectId::new(),
        title,
        text,
        rating,
        bootcamp: bootcamp_id,
        user: actor.id,
        created_at: DateTime::now(),
    };

    reviews.insert(&review).await?;
    rollup::refresh_average_rating(bootcamps, reviews, &bootcamp_id).await;

    Ok(review)
}

pub async fn process_update_review(
    bootcamps: &dyn BootcampRepository,
    reviews: &dyn ReviewRepository,
    actor: &AuthenticatedUser,
    id: ObjectId,
    request: UpdateReviewRequest,
) -> Result<Review, AppError> {
    require_role(actor, REVIEWERS)?;

    let current = reviews
        .find_by_id(&id)
        .await?
        .ok_or_else(|| review_not_found(&id))?;
    ensure_owner(actor, &current.user, "update", "review", &id)?;

    let request = request.normalized();
    request.validate()?;
    let update = request.into_update();
    if update.is_empty() {
        return Ok(current);
    }

    let review = reviews
        .update(&id, update)
        .await?
        .ok_or_else(|| review_not_found(&id))?;
    rollup::refresh_average_rating(bootcamps, reviews, &review.bootcamp).await;

    Ok(review)
}

pub async fn process_delete_review(
    bootcamps: &dyn BootcampRepository,
    reviews: &dyn ReviewRepository,
    actor: &AuthenticatedUser,
    id: ObjectId,
) -> Result<(), AppError> {
    require_role(actor, REVIEWERS)?;

    let current = reviews
        .find_by_id(&id)
        .await?
        .ok_or_else(|| review_not_found(&id))?;
    ensure_owner(actor, &current.user, "delete", "review", &id)?;

    reviews.delete(&id).await?;
    rollup::refresh_average_rating(bootcamps, reviews, &current.bootcamp).await;

    Ok(())
}

/// `GET /api/v1/reviews`
pub async fn list_reviews_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ApiResponse>, AppError> {
    let query = ListQuery::parse(query.as_deref(), &QUERY_SCHEMA)?;
    let page = state
        .review_repo
        .list(&query, state.settings.pagination_count_basis)
        .await?;
    Ok(Json(ApiResponse::page(page)))
}

/// `GET /api/v1/bootcamps/{bootcampId}/reviews`
pub async fn bootcamp_reviews_handler(
    State(state): State<AppState>,
    Path(bootcamp_id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let bootcamp_id = parse_id(&bootcamp_id)?;
    let reviews = state.review_repo.find_by_bootcamp(&bootcamp_id).await?;
    Ok(Json(ApiResponse::list(&reviews)?))
}

/// `GET /api/v1/reviews/{id}`
pub async fn get_review_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let id = parse_id(&id)?;
    let review = state
        .review_repo
        .find_joined(&id)
        .await?
        .ok_or_else(|| review_not_found(&id))?;
    Ok(Json(ApiResponse::data(document_to_json(review))))
}

/// `POST /api/v1/bootcamps/{bootcampId}/reviews`
pub async fn create_review_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(bootcamp_id): Path<String>,
    ApiJson(request): ApiJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), AppError> {
    let review = process_create_review(
        state.bootcamp_repo.as_ref(),
        state.review_repo.as_ref(),
        &actor,
        parse_id(&bootcamp_id)?,
        request,
    )
    .await?;
    Ok(ApiResponse::model(&review)?.created())
}

/// `PUT /api/v1/reviews/{id}`
pub async fn update_review_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateReviewRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let review = process_update_review(
        state.bootcamp_repo.as_ref(),
        state.review_repo.as_ref(),
        &actor,
        parse_id(&id)?,
        request,
    )
    .await?;
    Ok(Json(ApiResponse::model(&review)?))
}

/// `DELETE /api/v1/reviews/{id}`
pub async fn delete_review_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    process_delete_review(
        state.bootcamp_repo.as_ref(),
        state.review_repo.as_ref(),
        &actor,
        parse_id(&id)?,
    )
    .await?;
    Ok(Json(ApiResponse::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::bootcamp_repository::MockBootcampRepository;
    use crate::db::models::{Bootcamp, Career, DEFAULT_PHOTO};
    use crate::db::review_repository::MockReviewRepository;
    use crate::error::DUPLICATE_FIELD;

    fn actor(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            id: ObjectId::new(),
            name: "Reviewer".to_string(),
            email: "reviewer@example.com".to_string(),
            role,
        }
    }

    fn bootcamp() -> Bootcamp {
        Bootcamp {
            id: ObjectId::new(),
            name: "Devworks Bootcamp".to_string(),
            slug: "devworks-bootcamp".to_string(),
            description: "Full stack".to_string(),
            website: None,
            phone: None,
            email: None,
            address: None,
            location: None,
            careers: vec![Career::WebDevelopment],
            average_rating: None,
            average_cost: None,
            photo: DEFAULT_PHOTO.to_string(),
            housing: false,
            job_assistance: false,
            job_guarantee: false,
            accept_gi: false,
            user: ObjectId::new(),
            created_at: DateTime::now(),
        }
    }

    fn stored(author: ObjectId) -> Review {
        Review {
            id: ObjectId::new(),
            title: "Learned a ton!".to_string(),
            text: "Great bootcamp".to_string(),
            rating: 8,
            bootcamp: ObjectId::new(),
            user: author,
            created_at: DateTime::now(),
        }
    }

    #[tokio::test]
    async fn test_publishers_cannot_review() {
        let err = process_create_review(
            &MockBootcampRepository::new(),
            &MockReviewRepository::new(),
            &actor(Role::Publisher),
            ObjectId::new(),
            CreateReviewRequest::default(),
        )
        .await
        .unwrap_err();

        match err {
            AppError::Forbidden(msg) => assert_eq!(
                msg,
                "User role \"publisher\" is not authorized to access this route"
            ),
            other => panic!("Expected Forbidden, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_review_on_missing_bootcamp() {
        let mut bootcamps = MockBootcampRepository::new();
        bootcamps.expect_find_by_id().returning(|_| Ok(None));

        let camp_id = ObjectId::new();
        let err = process_create_review(
            &bootcamps,
            &MockReviewRepository::new(),
            &actor(Role::User),
            camp_id,
            CreateReviewRequest::default(),
        )
        .await
        .unwrap_err();

        match err {
            AppError::NotFound(msg) => {
                assert_eq!(msg, format!("No bootcamp with the id of {camp_id}"))
            }
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rating_out_of_range() {
        let mut bootcamps = MockBootcampRepository::new();
        bootcamps
            .expect_find_by_id()
            .returning(|_| Ok(Some(bootcamp())));

        let mut reviews = MockReviewRepository::new();
        reviews.expect_insert().never();

        let err = process_create_review(
            &bootcamps,
            &reviews,
            &actor(Role::User),
            ObjectId::new(),
            CreateReviewRequest {
                title: Some("Nice".into()),
                text: Some("Solid".into()),
                rating: Some(11),
            },
        )
        .await
        .unwrap_err();

        match err {
            AppError::Validation(messages) => {
                assert_eq!(messages, vec!["Please add a rating between 1 and 10"])
            }
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_update_is_rejected() {
        let author = actor(Role::User);
        let review = stored(author.id);
        let id = review.id;

        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_find_by_id()
            .returning(move |_| Ok(Some(review.clone())));
        reviews.expect_update().never();

        let err = process_update_review(
            &MockBootcampRepository::new(),
            &reviews,
            &author,
            id,
            UpdateReviewRequest {
                title: Some("  ".into()),
                text: Some("\n".into()),
                rating: None,
            },
        )
        .await
        .unwrap_err();

        match err {
            AppError::Validation(messages) => assert_eq!(
                messages,
                vec!["Please add some text", "Please add a title for the review"]
            ),
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_trims_text() {
        let author = actor(Role::User);
        let review = stored(author.id);
        let id = review.id;
        let updated = review.clone();

        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_find_by_id()
            .returning(move |_| Ok(Some(review.clone())));
        reviews
            .expect_update()
            .withf(|_, update| {
                *update == mongodb::bson::doc! { "$set": { "text": "Would recommend", "rating": 9 } }
            })
            .times(1)
            .returning(move |_, _| Ok(Some(updated.clone())));
        reviews.expect_average_rating().returning(|_| Ok(Some(9.0)));

        let mut bootcamps = MockBootcampRepository::new();
        bootcamps.expect_update().returning(|_, _| Ok(None));

        process_update_review(
            &bootcamps,
            &reviews,
            &author,
            id,
            UpdateReviewRequest {
                title: None,
                text: Some(" Would recommend  ".into()),
                rating: Some(9),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_second_review_is_rejected() {
        let mut bootcamps = MockBootcampRepository::new();
        bootcamps
            .expect_find_by_id()
            .returning(|_| Ok(Some(bootcamp())));
        bootcamps.expect_update().never();

        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_insert()
            .returning(|_| Err(AppError::BadRequest(DUPLICATE_FIELD.to_string())));
        reviews.expect_average_rating().never();

        let err = process_create_review(
            &bootcamps,
            &reviews,
            &actor(Role::User),
            ObjectId::new(),
            CreateReviewRequest {
                title: Some("Nice".into()),
                text: Some("Solid".into()),
                rating: Some(7),
            },
        )
        .await
        .unwrap_err();

        match err {
            AppError::BadRequest(msg) => assert_eq!(msg, DUPLICATE_FIELD),
            other => panic!("Expected BadRequest, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_author_or_admin_may_delete() {
        let author = actor(Role::User);
        let review = stored(author.id);
        let id = review.id;

        let mut reviews = MockReviewRepository::new();
        let found = review.clone();
        reviews
            .expect_find_by_id()
            .returning(move |_| Ok(Some(found.clone())));
        reviews.expect_delete().never();

        let err = process_delete_review(
            &MockBootcampRepository::new(),
            &reviews,
            &actor(Role::User),
            id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_admin_delete_recomputes_rating() {
        let review = stored(ObjectId::new());
        let id = review.id;
        let camp = review.bootcamp;

        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_find_by_id()
            .returning(move |_| Ok(Some(review.clone())));
        reviews.expect_delete().times(1).returning(|_| Ok(()));
        reviews.expect_average_rating().returning(|_| Ok(None));

        let mut bootcamps = MockBootcampRepository::new();
        bootcamps
            .expect_update()
            .withf(move |target, update| *target == camp && update.contains_key("$unset"))
            .times(1)
            .returning(|_, _| Ok(None));

        process_delete_review(&bootcamps, &reviews, &actor(Role::Admin), id)
            .await
            .unwrap();
    }
}
