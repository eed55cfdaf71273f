//! Bulk import and removal of fixture data for development databases.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Bson, DateTime, Document};
use serde::de::DeserializeOwned;

use crate::auth::password::hash_password;
use crate::db::bootcamp_repository::BootcampRepository;
use crate::db::course_repository::CourseRepository;
use crate::db::models::{Bootcamp, Course, Review, User, DEFAULT_PHOTO};
use crate::db::review_repository::ReviewRepository;
use crate::db::user_repository::UserRepository;
use crate::geocoder::client::Geocoder;
use crate::services::{geo, rollup, slug::slugify};

/// Fields that reference documents and arrive as hex strings.
const ID_FIELDS: &[&str] = &["_id", "user", "bootcamp"];

/// Raw records read from a fixture directory.
#[derive(Debug, Default)]
pub struct SeedData {
    pub users: Vec<Document>,
    pub bootcamps: Vec<Document>,
    pub courses: Vec<Document>,
    pub reviews: Vec<Document>,
}

/// How many records of each kind were written.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub bootcamps: usize,
    pub courses: usize,
    pub reviews: usize,
}

/// Repositories the seeder writes through.
pub struct SeedTargets<'a> {
    pub bootcamps: &'a dyn BootcampRepository,
    pub courses: &'a dyn CourseRepository,
    pub reviews: &'a dyn ReviewRepository,
    pub users: &'a dyn UserRepository,
}

fn read_records(path: &Path) -> anyhow::Result<Vec<Document>> {
    if !path.exists() {
        tracing::info!("{} not found, skipping", path.display());
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array", path.display()))?;

    values
        .iter()
        .map(|value| bson::to_document(value).map_err(anyhow::Error::from))
        .collect::<anyhow::Result<Vec<_>>>()
        .with_context(|| format!("{} holds a non-object record", path.display()))
}

/// Read `users.json`, `bootcamps.json`, `courses.json` and `reviews.json`
/// from `dir`. Missing files count as empty.
pub fn load_dir(dir: &Path) -> anyhow::Result<SeedData> {
    Ok(SeedData {
        users: read_records(&dir.join("users.json"))?,
        bootcamps: read_records(&dir.join("bootcamps.json"))?,
        courses: read_records(&dir.join("courses.json"))?,
        reviews: read_records(&dir.join("reviews.json"))?,
    })
}

/// Turn hex id strings into ObjectIds and stamp missing ids and timestamps.
fn normalize_ids(mut record: Document) -> anyhow::Result<Document> {
    for field in ID_FIELDS {
        if let Some(Bson::String(hex)) = record.get(*field) {
            let id = ObjectId::parse_str(hex)
                .with_context(|| format!("'{hex}' in field '{field}' is not an ObjectId"))?;
            record.insert(*field, id);
        }
    }
    if !record.contains_key("_id") {
        record.insert("_id", ObjectId::new());
    }
    if !record.contains_key("createdAt") {
        record.insert("createdAt", DateTime::now());
    }
    Ok(record)
}

fn decode<T: DeserializeOwned>(record: Document, kind: &str) -> anyhow::Result<T> {
    let id = record.get("_id").map(ToString::to_string).unwrap_or_default();
    bson::from_document(record).with_context(|| format!("Invalid {kind} record {id}"))
}

/// Prepare a user record: hash its plaintext password, default the role.
pub fn prepare_user(record: Document) -> anyhow::Result<User> {
    let mut record = normalize_ids(record)?;
    let password = record
        .get_str("password")
        .context("User record without password")?;
    let hash = hash_password(password)?;
    record.insert("password", hash);
    decode(record, "user")
}

/// Prepare a bootcamp record: derive the slug and default the photo.
/// The address is geocoded when a geocoder is available.
pub async fn prepare_bootcamp(
    record: Document,
    geocoder: Option<&dyn Geocoder>,
) -> anyhow::Result<Bootcamp> {
    let mut record = normalize_ids(record)?;

    let name = record.get_str("name").context("Bootcamp record without name")?;
    let slug = slugify(name);
    record.insert("slug", slug);
    if !record.contains_key("photo") {
        record.insert("photo", DEFAULT_PHOTO);
    }
    if !record.contains_key("careers") {
        record.insert("careers", Bson::Array(Vec::new()));
    }

    let mut bootcamp: Bootcamp = decode(record, "bootcamp")?;

    if let (Some(geocoder), Some(address)) = (geocoder, bootcamp.address.clone()) {
        match geo::locate(geocoder, &address).await {
            Ok(location) => {
                bootcamp.location = Some(location);
                bootcamp.address = None;
            }
            Err(err) => tracing::warn!(bootcamp = %bootcamp.id, "Address left as is: {err}"),
        }
    }

    Ok(bootcamp)
}

pub fn prepare_course(record: Document) -> anyhow::Result<Course> {
    let mut record = normalize_ids(record)?;
    // Fixtures carry weeks as numbers or strings.
    match record.get("weeks") {
        Some(Bson::Int32(n)) => {
            let weeks = n.to_string();
            record.insert("weeks", weeks);
        }
        Some(Bson::Int64(n)) => {
            let weeks = n.to_string();
            record.insert("weeks", weeks);
        }
        _ => {}
    }
    if let Some(Bson::Int32(n)) = record.get("tuition") {
        let tuition = f64::from(*n);
        record.insert("tuition", tuition);
    }
    decode(record, "course")
}

pub fn prepare_review(record: Document) -> anyhow::Result<Review> {
    decode(normalize_ids(record)?, "review")
}

/// Insert every record, then recompute the averages of touched bootcamps.
pub async fn import(
    targets: &SeedTargets<'_>,
    data: SeedData,
    geocoder: Option<&dyn Geocoder>,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for record in data.users {
        let user = prepare_user(record)?;
        targets.users.insert(&user).await?;
        summary.users += 1;
    }

    for record in data.bootcamps {
        let bootcamp = prepare_bootcamp(record, geocoder).await?;
        targets.bootcamps.insert(&bootcamp).await?;
        summary.bootcamps += 1;
    }

    let mut touched = BTreeSet::new();

    for record in data.courses {
        let course = prepare_course(record)?;
        targets.courses.insert(&course).await?;
        touched.insert(course.bootcamp);
        summary.courses += 1;
    }

    for record in data.reviews {
        let review = prepare_review(record)?;
        targets.reviews.insert(&review).await?;
        touched.insert(review.bootcamp);
        summary.reviews += 1;
    }

    for bootcamp in &touched {
        rollup::recompute_average_cost(targets.bootcamps, targets.courses, bootcamp).await?;
        rollup::recompute_average_rating(targets.bootcamps, targets.reviews, bootcamp).await?;
    }

    tracing::info!(?summary, "Data imported");
    Ok(summary)
}

/// Empty the four collections.
pub async fn destroy(db: &mongodb::Database) -> anyhow::Result<u64> {
    use crate::db::{bootcamp_repository, course_repository, review_repository, user_repository};

    let mut removed = 0;
    for name in [
        course_repository::COLLECTION,
        review_repository::COLLECTION,
        bootcamp_repository::COLLECTION,
        user_repository::COLLECTION,
    ] {
        let result = db
            .collection::<Document>(name)
            .delete_many(Document::new())
            .await?;
        tracing::info!("Removed {} documents from {name}", result.deleted_count);
        removed += result.deleted_count;
    }

    tracing::info!("Data destroyed");
    Ok(removed)
}
