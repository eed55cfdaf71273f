use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use devcamper::config::Settings;
use devcamper::db::bootcamp_repository::MongoBootcampRepository;
use devcamper::db::course_repository::MongoCourseRepository;
use devcamper::db::review_repository::MongoReviewRepository;
use devcamper::db::user_repository::MongoUserRepository;
use devcamper::geocoder::client::{Geocoder, MapQuestGeocoder};
use devcamper::services::seed::{self, SeedTargets};

#[derive(Parser)]
#[command(name = "seeder", version, about = "Load or wipe DevCamper fixture data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import users, bootcamps, courses and reviews from JSON files
    Import {
        /// Directory holding users.json, bootcamps.json, courses.json, reviews.json
        #[arg(long, default_value = "_data")]
        data_dir: PathBuf,
        /// Store addresses as given instead of geocoding them
        #[arg(long)]
        no_geocode: bool,
    },
    /// Delete every document from the four collections
    Destroy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devcamper=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;

    let client = mongodb::Client::with_uri_str(&settings.mongodb_uri)
        .await
        .context("Failed to connect to MongoDB")?;
    let db = client.database(&settings.mongodb_database);

    match cli.command {
        Commands::Import {
            data_dir,
            no_geocode,
        } => {
            let data = seed::load_dir(&data_dir)?;

            let bootcamps = MongoBootcampRepository::new(&db);
            let courses = MongoCourseRepository::new(&db);
            let reviews = MongoReviewRepository::new(&db);
            let users = MongoUserRepository::new(&db);

            let geocoder: Option<Arc<dyn Geocoder>> =
                if no_geocode || settings.geocoder_api_key.is_empty() {
                    None
                } else {
                    Some(Arc::new(MapQuestGeocoder::new(
                        &settings.geocoder_base_url,
                        &settings.geocoder_api_key,
                    )?))
                };

            let targets = SeedTargets {
                bootcamps: &bootcamps,
                courses: &courses,
                reviews: &reviews,
                users: &users,
            };
            let summary = seed::import(&targets, data, geocoder.as_deref()).await?;
            println!(
                "Data imported: {} users, {} bootcamps, {} courses, {} reviews",
                summary.users, summary.bootcamps, summary.courses, summary.reviews
            );
        }
        Commands::Destroy => {
            let removed = seed::destroy(&db).await?;
            println!("Data destroyed: {removed} documents removed");
        }
    }

    Ok(())
}
