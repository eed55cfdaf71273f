use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::IndexModel;

use crate::db::models::Course;
use crate::db::query::{
    self, CountBasis, FieldKind, FieldSpec, Join, ListPage, ListQuery, QuerySchema, COMPARISON,
    EQUALITY, EXACT, RANGE,
};
use crate::error::AppError;

pub const COLLECTION: &str = "courses";

pub const QUERY_SCHEMA: QuerySchema = QuerySchema {
    filters: &[
        FieldSpec::new("title", FieldKind::String, EQUALITY),
        FieldSpec::new("weeks", FieldKind::String, EQUALITY),
        FieldSpec::new("tuition", FieldKind::Number, COMPARISON),
        FieldSpec::new("minimumSkill", FieldKind::String, EQUALITY),
        FieldSpec::new("scholarshipAvailable", FieldKind::Boolean, EXACT),
        FieldSpec::new("bootcamp", FieldKind::ObjectId, EQUALITY),
        FieldSpec::new("user", FieldKind::ObjectId, EQUALITY),
        FieldSpec::new("createdAt", FieldKind::Date, RANGE),
    ],
    fields: &[
        "title",
        "description",
        "weeks",
        "tuition",
        "minimumSkill",
        "scholarshipAvailable",
        "bootcamp",
        "user",
        "createdAt",
    ],
    hidden: &[],
};

/// Courses show which bootcamp they belong to.
pub const BOOTCAMP_JOIN: Join = Join {
    from: "bootcamps",
    local_field: "bootcamp",
    foreign_field: "_id",
    as_field: "bootcamp",
    fields: &["name", "description"],
    single: true,
};

/// Repository trait for course persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn ensure_indexes(&self) -> Result<(), AppError>;

    async fn insert(&self, course: &Course) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Course>, AppError>;

    /// Course with its bootcamp summary inlined.
    async fn find_joined(&self, id: &ObjectId) -> Result<Option<Document>, AppError>;

    async fn find_by_bootcamp(&self, bootcamp: &ObjectId) -> Result<Vec<Course>, AppError>;

    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<Course>, AppError>;

    async fn delete(&self, id: &ObjectId) -> Result<(), AppError>;

    /// Remove every course of a bootcamp, returning how many were deleted.
    async fn delete_by_bootcamp(&self, bootcamp: &ObjectId) -> Result<u64, AppError>;

    /// Mean tuition over a bootcamp's courses, `None` when it has none.
    async fn average_tuition(&self, bootcamp: &ObjectId) -> Result<Option<f64>, AppError>;

    async fn list(&self, query: &ListQuery, basis: CountBasis) -> Result<ListPage, AppError>;
}

/// MongoDB implementation of the CourseRepository.
pub struct MongoCourseRepository {
    collection: mongodb::Collection<Course>,
}

impl MongoCourseRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(COLLECTION),
        }
    }
}

#[async_trait]
impl CourseRepository for MongoCourseRepository {
    async fn ensure_indexes(&self) -> Result<(), AppError> {
        let by_bootcamp = IndexModel::builder()
            .keys(doc! { "bootcamp": 1 })
            .build();

        self.collection.create_index(by_bootcamp).await?;
        Ok(())
    }

    async fn insert(&self, course: &Course) -> Result<(), AppError> {
        self.collection.insert_one(course).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Course>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_joined(&self, id: &ObjectId) -> Result<Option<Document>, AppError> {
        query::find_one_joined(&self.collection, id, &BOOTCAMP_JOIN).await
    }

    async fn find_by_bootcamp(&self, bootcamp: &ObjectId) -> Result<Vec<Course>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .build();

        let cursor = self
            .collection
            .find(doc! { "bootcamp": bootcamp })
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<Course>, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id }, update)
            .with_options(options)
            .await?)
    }

    async fn delete(&self, id: &ObjectId) -> Result<(), AppError> {
        self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(())
    }

    async fn delete_by_bootcamp(&self, bootcamp: &ObjectId) -> Result<u64, AppError> {
        let result = self
            .collection
            .delete_many(doc! { "bootcamp": bootcamp })
            .await?;
        Ok(result.deleted_count)
    }

    async fn average_tuition(&self, bootcamp: &ObjectId) -> Result<Option<f64>, AppError> {
        let pipeline = vec![
            doc! { "$match": { "bootcamp": bootcamp } },
            doc! { "$group": { "_id": "$bootcamp", "average": { "$avg": "$tuition" } } },
        ];

        let mut cursor = self.collection.aggregate(pipeline).await?;
        let group = cursor.try_next().await?;
        Ok(group.and_then(|g| g.get_f64("average").ok()))
    }

    async fn list(&self, query: &ListQuery, basis: CountBasis) -> Result<ListPage, AppError> {
        query::execute(&self.collection, &QUERY_SCHEMA, query, Some(&BOOTCAMP_JOIN), basis).await
    }
}
