use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::tokens::TokenIssuer;
use crate::config::Settings;
use crate::db::bootcamp_repository::BootcampRepository;
use crate::db::course_repository::CourseRepository;
use crate::db::review_repository::ReviewRepository;
use crate::db::user_repository::UserRepository;
use crate::geocoder::client::Geocoder;
use crate::mail::client::Mailer;
use crate::storage::client::StorageClient;

/// Multipart framing allowance on top of the photo size limit, so oversize
/// images reach the handler and get a descriptive error.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub bootcamp_repo: Arc<dyn BootcampRepository>,
    pub course_repo: Arc<dyn CourseRepository>,
    pub review_repo: Arc<dyn ReviewRepository>,
    pub user_repo: Arc<dyn UserRepository>,
    pub geocoder: Arc<dyn Geocoder>,
    pub mailer: Arc<dyn Mailer>,
    pub storage_client: Arc<dyn StorageClient>,
    pub tokens: TokenIssuer,
    pub settings: Arc<Settings>,
}

fn bootcamp_routes(state: &AppState) -> Router<AppState> {
    let photo_limit = state.settings.max_file_upload + MULTIPART_OVERHEAD;

    Router::new()
        .route(
            "/",
            get(api::bootcamps::list_bootcamps_handler)
                .post(api::bootcamps::create_bootcamp_handler),
        )
        .route(
            "/{id}",
            get(api::bootcamps::get_bootcamp_handler)
                .put(api::bootcamps::update_bootcamp_handler)
                .delete(api::bootcamps::delete_bootcamp_handler),
        )
        .route(
            "/radius/{zipcode}/{distance}",
            get(api::bootcamps::bootcamps_in_radius_handler),
        )
        .route(
            "/{id}/photo",
            put(api::upload::upload_photo_handler).layer(DefaultBodyLimit::max(photo_limit)),
        )
        .route(
            "/{id}/courses",
            get(api::courses::bootcamp_courses_handler)
                .post(api::courses::create_course_handler),
        )
        .route(
            "/{id}/reviews",
            get(api::reviews::bootcamp_reviews_handler)
                .post(api::reviews::create_review_handler),
        )
}

fn course_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api::courses::list_courses_handler))
        .route(
            "/{id}",
            get(api::courses::get_course_handler)
                .put(api::courses::update_course_handler)
                .delete(api::courses::delete_course_handler),
        )
}

fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api::reviews::list_reviews_handler))
        .route(
            "/{id}",
            get(api::reviews::get_review_handler)
                .put(api::reviews::update_review_handler)
                .delete(api::reviews::delete_review_handler),
        )
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(api::auth::register_handler))
        .route("/login", post(api::auth::login_handler))
        .route("/logout", get(api::auth::logout_handler))
        .route("/me", get(api::auth::me_handler))
        .route("/updatedetails", put(api::auth::update_details_handler))
        .route("/updatepassword", put(api::auth::update_password_handler))
        .route("/forgotpassword", post(api::auth::forgot_password_handler))
        .route("/resetpassword/{token}", put(api::auth::reset_password_handler))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(api::users::list_users_handler).post(api::users::create_user_handler),
        )
        .route(
            "/{id}",
            get(api::users::get_user_handler)
                .put(api::users::update_user_handler)
                .delete(api::users::delete_user_handler),
        )
}

/// Build the full HTTP application: `/api/v1` routes plus uploaded photos
/// under `/uploads`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/bootcamps", bootcamp_routes(&state))
        .nest("/courses", course_routes())
        .nest("/reviews", review_routes())
        .nest("/auth", auth_routes())
        .nest("/users", user_routes());

    let uploads = ServeDir::new(&state.settings.file_upload_path);

    Router::new()
        .nest("/api/v1", api)
        .nest_service("/uploads", uploads)
        .layer(CatchPanicLayer::custom(api::errors::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
