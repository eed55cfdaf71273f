//! Derived bootcamp averages, recomputed after every course or review write.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};

use crate::db::bootcamp_repository::BootcampRepository;
use crate::db::course_repository::CourseRepository;
use crate::db::review_repository::ReviewRepository;
use crate::error::AppError;

/// Average tuition rounded up to the next multiple of ten.
pub fn round_cost(average: f64) -> f64 {
    (average / 10.0).ceil() * 10.0
}

fn set_or_unset(field: &str, value: Option<f64>) -> Document {
    match value {
        Some(v) => doc! { "$set": { field: v } },
        None => doc! { "$unset": { field: "" } },
    }
}

/// Recompute `averageCost` of `bootcamp` from its courses.
pub async fn recompute_average_cost(
    bootcamps: &dyn BootcampRepository,
    courses: &dyn CourseRepository,
    bootcamp: &ObjectId,
) -> Result<(), AppError> {
    let average = courses.average_tuition(bootcamp).await?.map(round_cost);
    bootcamps
        .update(bootcamp, set_or_unset("averageCost", average))
        .await?;
    Ok(())
}

/// Recompute `averageRating` of `bootcamp` from its reviews.
pub async fn recompute_average_rating(
    bootcamps: &dyn BootcampRepository,
    reviews: &dyn ReviewRepository,
    bootcamp: &ObjectId,
) -> Result<(), AppError> {
    let average = reviews.average_rating(bootcamp).await?;
    bootcamps
        .update(bootcamp, set_or_unset("averageRating", average))
        .await?;
    Ok(())
}

/// Like [`recompute_average_cost`], for callers whose write already committed.
pub async fn refresh_average_cost(
    bootcamps: &dyn BootcampRepository,
    courses: &dyn CourseRepository,
    bootcamp: &ObjectId,
) {
    if let Err(e) = recompute_average_cost(bootcamps, courses, bootcamp).await {
        tracing::warn!(%bootcamp, "Failed to recompute average cost: {e}");
    }
}

/// Like [`recompute_average_rating`], for callers whose write already committed.
pub async fn refresh_average_rating(
    bootcamps: &dyn BootcampRepository,
    reviews: &dyn ReviewRepository,
    bootcamp: &ObjectId,
) {
    if let Err(e) = recompute_average_rating(bootcamps, reviews, bootcamp).await {
        tracing::warn!(%bootcamp, "Failed to recompute average rating: {e}");
    }
}
