use mongodb::bson::oid::ObjectId;

use crate::db::bootcamp_repository::BootcampRepository;
use crate::db::course_repository::CourseRepository;
use crate::db::review_repository::ReviewRepository;
use crate::error::AppError;

/// Delete a bootcamp together with its courses and reviews.
///
/// Children go first so a failure never leaves orphans behind a missing
/// bootcamp.
pub async fn delete_bootcamp(
    bootcamps: &dyn BootcampRepository,
    courses: &dyn CourseRepository,
    reviews: &dyn ReviewRepository,
    id: &ObjectId,
) -> Result<(), AppError> {
    let removed_courses = courses.delete_by_bootcamp(id).await?;
    let removed_reviews = reviews.delete_by_bootcamp(id).await?;
    bootcamps.delete(id).await?;

    tracing::info!(
        bootcamp = %id,
        courses = removed_courses,
        reviews = removed_reviews,
        "Deleted bootcamp"
    );
    Ok(())
}
