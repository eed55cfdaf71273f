use std::sync::Arc;

use anyhow::Context;
use mongodb::bson::doc;

use devcamper::app::{build_router, AppState};
use devcamper::auth::tokens::TokenIssuer;
use devcamper::config::Settings;
use devcamper::db::bootcamp_repository::{BootcampRepository, MongoBootcampRepository};
use devcamper::db::course_repository::{CourseRepository, MongoCourseRepository};
use devcamper::db::review_repository::{MongoReviewRepository, ReviewRepository};
use devcamper::db::user_repository::{MongoUserRepository, UserRepository};
use devcamper::geocoder::client::{Geocoder, MapQuestGeocoder};
use devcamper::mail::client::{HttpMailer, LogMailer, Mailer};
use devcamper::storage::client::{LocalStorageClient, StorageClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devcamper=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting DevCamper API...");

    let settings = Settings::load().context("Failed to load configuration")?;

    // Connect to MongoDB
    let mongo_client = mongodb::Client::with_uri_str(&settings.mongodb_uri)
        .await
        .context("Failed to connect to MongoDB")?;
    let mongo_db = mongo_client.database(&settings.mongodb_database);
    mongo_db
        .run_command(doc! { "ping": 1 })
        .await
        .context("MongoDB did not answer ping")?;

    tracing::info!("Connected to MongoDB database '{}'", settings.mongodb_database);

    let bootcamp_repo: Arc<dyn BootcampRepository> =
        Arc::new(MongoBootcampRepository::new(&mongo_db));
    let course_repo: Arc<dyn CourseRepository> = Arc::new(MongoCourseRepository::new(&mongo_db));
    let review_repo: Arc<dyn ReviewRepository> = Arc::new(MongoReviewRepository::new(&mongo_db));
    let user_repo: Arc<dyn UserRepository> = Arc::new(MongoUserRepository::new(&mongo_db));

    bootcamp_repo.ensure_indexes().await?;
    course_repo.ensure_indexes().await?;
    review_repo.ensure_indexes().await?;
    user_repo.ensure_indexes().await?;

    let geocoder: Arc<dyn Geocoder> = Arc::new(MapQuestGeocoder::new(
        &settings.geocoder_base_url,
        &settings.geocoder_api_key,
    )?);

    let mailer: Arc<dyn Mailer> = match &settings.mail_api_url {
        Some(url) => Arc::new(HttpMailer::new(
            url,
            &settings.mail_api_key,
            &settings.from_email,
            &settings.from_name,
        )?),
        None => {
            tracing::warn!("MAIL_API_URL not set - outgoing mail will only be logged");
            Arc::new(LogMailer)
        }
    };

    let storage = LocalStorageClient::new(&settings.file_upload_path);
    storage.ensure_root().await?;
    tracing::info!("Storing uploads in {}", storage.root().display());
    let storage_client: Arc<dyn StorageClient> = Arc::new(storage);

    let tokens = TokenIssuer::new(&settings.jwt_secret, settings.jwt_expire_days);
    let addr = settings.bind_address();

    let app_state = AppState {
        bootcamp_repo,
        course_repo,
        review_repo,
        user_repo,
        geocoder,
        mailer,
        storage_client,
        tokens,
        settings: Arc::new(settings),
    };

    let app = build_router(app_state);

    // Start the server
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
