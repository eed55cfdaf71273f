use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::IndexModel;

use crate::db::models::Bootcamp;
use crate::db::query::{
    self, CountBasis, FieldKind, FieldSpec, Join, ListPage, ListQuery, QuerySchema, COMPARISON,
    EQUALITY, EXACT, RANGE,
};
use crate::error::AppError;

pub const COLLECTION: &str = "bootcamps";

/// What `GET /bootcamps` lets clients filter, select and sort on.
pub const QUERY_SCHEMA: QuerySchema = QuerySchema {
    filters: &[
        FieldSpec::new("name", FieldKind::String, EQUALITY),
        FieldSpec::new("slug", FieldKind::String, EQUALITY),
        FieldSpec::new("careers", FieldKind::String, EQUALITY),
        FieldSpec::new("averageCost", FieldKind::Number, COMPARISON),
        FieldSpec::new("averageRating", FieldKind::Number, COMPARISON),
        FieldSpec::new("housing", FieldKind::Boolean, EXACT),
        FieldSpec::new("jobAssistance", FieldKind::Boolean, EXACT),
        FieldSpec::new("jobGuarantee", FieldKind::Boolean, EXACT),
        FieldSpec::new("acceptGi", FieldKind::Boolean, EXACT),
        FieldSpec::new("user", FieldKind::ObjectId, EQUALITY),
        FieldSpec::new("location.city", FieldKind::String, EQUALITY),
        FieldSpec::new("location.state", FieldKind::String, EQUALITY),
        FieldSpec::new("location.zipcode", FieldKind::String, EQUALITY),
        FieldSpec::new("createdAt", FieldKind::Date, RANGE),
    ],
    fields: &[
        "name",
        "slug",
        "description",
        "website",
        "phone",
        "email",
        "location",
        "careers",
        "averageRating",
        "averageCost",
        "photo",
        "housing",
        "jobAssistance",
        "jobGuarantee",
        "acceptGi",
        "user",
        "createdAt",
    ],
    hidden: &[],
};

/// Listed bootcamps carry their courses.
pub const COURSES_JOIN: Join = Join {
    from: "courses",
    local_field: "_id",
    foreign_field: "bootcamp",
    as_field: "courses",
    fields: &[],
    single: false,
};

/// Repository trait for bootcamp persistence.
///
/// This trait allows mocking the database layer in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BootcampRepository: Send + Sync {
    /// Create the unique name index and the 2dsphere location index.
    async fn ensure_indexes(&self) -> Result<(), AppError>;

    async fn insert(&self, bootcamp: &Bootcamp) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Bootcamp>, AppError>;

    /// Number of bootcamps owned by `user`.
    async fn count_by_owner(&self, user: &ObjectId) -> Result<u64, AppError>;

    /// Apply an update document (`$set` / `$unset`) and return the new state.
    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<Bootcamp>, AppError>;

    async fn delete(&self, id: &ObjectId) -> Result<(), AppError>;

    /// Filtered, sorted and paginated listing with courses inlined.
    async fn list(&self, query: &ListQuery, basis: CountBasis) -> Result<ListPage, AppError>;

    /// Bootcamps whose location lies within `radius` radians of the point.
    async fn within_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius: f64,
    ) -> Result<Vec<Bootcamp>, AppError>;
}

/// MongoDB implementation of the BootcampRepository.
pub struct MongoBootcampRepository {
    collection: mongodb::Collection<Bootcamp>,
}

impl MongoBootcampRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(COLLECTION),
        }
    }
}

#[async_trait]
impl BootcampRepository for MongoBootcampRepository {
    async fn ensure_indexes(&self) -> Result<(), AppError> {
        let unique_name = IndexModel::builder()
            .keys(doc! { "name": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let geo = IndexModel::builder()
            .keys(doc! { "location": "2dsphere" })
            .build();

        self.collection.create_indexes(vec![unique_name, geo]).await?;
        Ok(())
    }

    async fn insert(&self, bootcamp: &Bootcamp) -> Result<(), AppError> {
        self.collection.insert_one(bootcamp).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Bootcamp>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn count_by_owner(&self, user: &ObjectId) -> Result<u64, AppError> {
        Ok(self.collection.count_documents(doc! { "user": user }).await?)
    }

    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<Bootcamp>, AppError> {
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

    async fn list(&self, query: &ListQuery, basis: CountBasis) -> Result<ListPage, AppError> {
        query::execute(&self.collection, &QUERY_SCHEMA, query, Some(&COURSES_JOIN), basis).await
    }

    async fn within_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius: f64,
    ) -> Result<Vec<Bootcamp>, AppError> {
        let filter = doc! {
            "location": {
                "$geoWithin": { "$centerSphere": [[longitude, latitude], radius] }
            }
        };

        let cursor = self.collection.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }
}
