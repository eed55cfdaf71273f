#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mongo::Mongo;

use devcamper::app::{build_router, AppState};
use devcamper::auth::tokens::TokenIssuer;
use devcamper::config::Settings;
use devcamper::db::bootcamp_repository::{BootcampRepository, MongoBootcampRepository};
use devcamper::db::course_repository::{CourseRepository, MongoCourseRepository};
use devcamper::db::review_repository::{MongoReviewRepository, ReviewRepository};
use devcamper::db::query::CountBasis;
use devcamper::db::user_repository::{MongoUserRepository, UserRepository};
use devcamper::error::AppError;
use devcamper::geocoder::client::{GeocodedAddress, Geocoder};
use devcamper::mail::client::{MailMessage, Mailer};
use devcamper::storage::client::{LocalStorageClient, StorageClient};

/// Photo size limit used by the test router.
pub const MAX_UPLOAD: usize = 1000;

/// Resolves a handful of known places; anything mentioning "nowhere" is unknown.
pub struct FakeGeocoder;

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, AppError> {
        if address.to_lowercase().contains("nowhere") {
            return Ok(None);
        }

        let (longitude, latitude, city, zipcode) = if address.contains("Lowell")
            || address.contains("01854")
        {
            (-71.324239, 42.638470, "Lowell", "01854")
        } else if address.contains("Boston") || address.contains("02118") {
            (-71.076621, 42.342600, "Boston", "02118")
        } else {
            (-122.419416, 37.774929, "San Francisco", "94103")
        };

        Ok(Some(GeocodedAddress {
            latitude,
            longitude,
            formatted_address: Some(format!("{city}, MA {zipcode}, US")),
            city: Some(city.to_string()),
            state: Some("MA".to_string()),
            zipcode: Some(zipcode.to_string()),
            country: Some("US".to_string()),
            ..Default::default()
        }))
    }
}

/// Keeps every message; can be switched to fail.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<MailMessage>>,
    pub failing: Mutex<bool>,
}

impl RecordingMailer {
    pub fn last(&self) -> Option<MailMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), AppError> {
        if *self.failing.lock().unwrap() {
            return Err(AppError::Mail("mail service unavailable".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Holds the running MongoDB container and the Axum router for integration tests.
///
/// The container and the upload directory live as long as this struct.
pub struct TestEnv {
    _mongo: ContainerAsync<Mongo>,
    pub uploads: tempfile::TempDir,
    pub router: Router,
    pub db: mongodb::Database,
    pub bootcamp_repo: Arc<dyn BootcampRepository>,
    pub course_repo: Arc<dyn CourseRepository>,
    pub review_repo: Arc<dyn ReviewRepository>,
    pub user_repo: Arc<dyn UserRepository>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestEnv {
    /// Start MongoDB and build a router wired to real repositories.
    pub async fn start() -> Self {
        Self::start_with(CountBasis::Collection).await
    }

    /// Like [`TestEnv::start`], deciding `pagination.next` with `basis`.
    pub async fn start_with(basis: CountBasis) -> Self {
        let mongo_container = Mongo::default()
            .start()
            .await
            .expect("Failed to start MongoDB container");
        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        let mongo_uri = format!("mongodb://127.0.0.1:{}", mongo_port);
        let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
            .await
            .expect("Failed to connect to MongoDB");
        let db = mongo_client.database("devcamper_test");

        let bootcamp_repo: Arc<dyn BootcampRepository> =
            Arc::new(MongoBootcampRepository::new(&db));
        let course_repo: Arc<dyn CourseRepository> = Arc::new(MongoCourseRepository::new(&db));
        let review_repo: Arc<dyn ReviewRepository> = Arc::new(MongoReviewRepository::new(&db));
        let user_repo: Arc<dyn UserRepository> = Arc::new(MongoUserRepository::new(&db));

        bootcamp_repo.ensure_indexes().await.expect("bootcamp indexes");
        course_repo.ensure_indexes().await.expect("course indexes");
        review_repo.ensure_indexes().await.expect("review indexes");
        user_repo.ensure_indexes().await.expect("user indexes");

        let uploads = tempfile::tempdir().expect("Failed to create upload dir");
        let storage: Arc<dyn StorageClient> = Arc::new(LocalStorageClient::new(uploads.path()));

        let settings = Settings {
            mongodb_uri: mongo_uri,
            mongodb_database: "devcamper_test".to_string(),
            jwt_secret: "integration-secret".to_string(),
            file_upload_path: uploads.path().to_string_lossy().into_owned(),
            max_file_upload: MAX_UPLOAD,
            pagination_count_basis: basis,
            ..Settings::default()
        };

        let mailer = Arc::new(RecordingMailer::default());

        let app_state = AppState {
            bootcamp_repo: bootcamp_repo.clone(),
            course_repo: course_repo.clone(),
            review_repo: review_repo.clone(),
            user_repo: user_repo.clone(),
            geocoder: Arc::new(FakeGeocoder),
            mailer: mailer.clone(),
            storage_client: storage,
            tokens: TokenIssuer::new(&settings.jwt_secret, settings.jwt_expire_days),
            settings: Arc::new(settings),
        };

        Self {
            _mongo: mongo_container,
            uploads,
            router: build_router(app_state),
            db,
            bootcamp_repo,
            course_repo,
            review_repo,
            user_repo,
            mailer,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .expect_success_by_default()
            .build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .build(self.router.clone())
            .expect("Failed to build TestServer")
    }

    /// Helper: register an account and return its session token.
    pub async fn register(
        &self,
        server: &axum_test::TestServer,
        name: &str,
        email: &str,
        role: &str,
    ) -> String {
        let response = server
            .post("/api/v1/auth/register")
            .json(&json!({
                "name": name,
                "email": email,
                "password": "123456",
                "role": role,
            }))
            .await;
        response.assert_status_ok();
        token_of(&response.json::<Value>())
    }

    /// Helper: create an admin directly in the database (admins cannot
    /// self-register) and log in as them.
    pub async fn admin_token(&self, server: &axum_test::TestServer) -> String {
        let email = "admin@devcamper.io";
        let token = self.register(server, "Admin Account", email, "publisher").await;

        let user_id = self
            .user_repo
            .find_by_email(email)
            .await
            .unwrap()
            .expect("admin was just registered")
            .id;
        self.user_repo
            .update(
                &user_id,
                mongodb::bson::doc! { "$set": { "role": "admin" } },
            )
            .await
            .unwrap();

        token
    }

    /// Helper: create a bootcamp and return its JSON representation.
    pub async fn create_bootcamp(
        &self,
        server: &axum_test::TestServer,
        token: &str,
        name: &str,
        address: &str,
    ) -> Value {
        let response = server
            .post("/api/v1/bootcamps")
            .authorization_bearer(token)
            .json(&json!({
                "name": name,
                "description": format!("{name} teaches full stack development"),
                "website": "https://devcamper.io",
                "address": address,
                "careers": ["Web Development", "UI/UX"],
                "housing": true,
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()["data"].clone()
    }

    /// Helper: add a course and return its JSON representation.
    pub async fn create_course(
        &self,
        server: &axum_test::TestServer,
        token: &str,
        bootcamp_id: &str,
        title: &str,
        tuition: f64,
    ) -> Value {
        let response = server
            .post(&format!("/api/v1/bootcamps/{bootcamp_id}/courses"))
            .authorization_bearer(token)
            .json(&json!({
                "title": title,
                "description": "Hands-on course",
                "weeks": "8",
                "tuition": tuition,
                "minimumSkill": "beginner",
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()["data"].clone()
    }
}

/// `token` field of a token response.
pub fn token_of(body: &Value) -> String {
    body["token"]
        .as_str()
        .expect("Response should contain a token")
        .to_string()
}

/// `_id` of a returned record.
pub fn id_of(record: &Value) -> String {
    record["_id"]
        .as_str()
        .expect("Record should have an _id")
        .to_string()
}
