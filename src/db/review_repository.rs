use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::IndexModel;

use crate::db::course_repository::BOOTCAMP_JOIN;
use crate::db::models::Review;
use crate::db::query::{
    self, CountBasis, FieldKind, FieldSpec, ListPage, ListQuery, QuerySchema, COMPARISON,
    EQUALITY, RANGE,
};
use crate::error::AppError;

pub const COLLECTION: &str = "reviews";

pub const QUERY_SCHEMA: QuerySchema = QuerySchema {
    filters: &[
        FieldSpec::new("title", FieldKind::String, EQUALITY),
        FieldSpec::new("rating", FieldKind::Number, COMPARISON),
        FieldSpec::new("bootcamp", FieldKind::ObjectId, EQUALITY),
        FieldSpec::new("user", FieldKind::ObjectId, EQUALITY),
        FieldSpec::new("createdAt", FieldKind::Date, RANGE),
    ],
    fields: &["title", "text", "rating", "bootcamp", "user", "createdAt"],
    hidden: &[],
};

/// Repository trait for review persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Create the unique `(bootcamp, user)` index.
    async fn ensure_indexes(&self) -> Result<(), AppError>;

    /// Fails with a duplicate-field error when the user already reviewed
    /// the bootcamp.
    async fn insert(&self, review: &Review) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Review>, AppError>;

    async fn find_joined(&self, id: &ObjectId) -> Result<Option<Document>, AppError>;

    async fn find_by_bootcamp(&self, bootcamp: &ObjectId) -> Result<Vec<Review>, AppError>;

    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<Review>, AppError>;

    async fn delete(&self, id: &ObjectId) -> Result<(), AppError>;

    async fn delete_by_bootcamp(&self, bootcamp: &ObjectId) -> Result<u64, AppError>;

    /// Mean rating over a bootcamp's reviews, `None` when it has none.
    async fn average_rating(&self, bootcamp: &ObjectId) -> Result<Option<f64>, AppError>;

    async fn list(&self, query: &ListQuery, basis: CountBasis) -> Result<ListPage, AppError>;
}

/// MongoDB implementation of the ReviewRepository.
pub struct MongoReviewRepository {
    collection: mongodb::Collection<Review>,
}

impl MongoReviewRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(COLLECTION),
        }
    }
}

#[async_trait]
impl ReviewRepository for MongoReviewRepository {
    async fn ensure_indexes(&self) -> Result<(), AppError> {
        let one_per_user = IndexModel::builder()
            .keys(doc! { "bootcamp": 1, "user": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.collection.create_index(one_per_user).await?;
        Ok(())
    }

    async fn insert(&self, review: &Review) -> Result<(), AppError> {
        self.collection.insert_one(review).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Review>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_joined(&self, id: &ObjectId) -> Result<Option<Document>, AppError> {
        query::find_one_joined(&self.collection, id, &BOOTCAMP_JOIN).await
    }

    async fn find_by_bootcamp(&self, bootcamp: &ObjectId) -> Result<Vec<Review>, AppError> {
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

    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<Review>, AppError> {
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

    async fn average_rating(&self, bootcamp: &ObjectId) -> Result<Option<f64>, AppError> {
        let pipeline = vec![
            doc! { "$match": { "bootcamp": bootcamp } },
            doc! { "$group": { "_id": "$bootcamp", "average": { "$avg": "$rating" } } },
        ];

        let mut cursor = self.collection.aggregate(pipeline).await?;
        let group = cursor.try_next().await?;
        Ok(group.and_then(|g| g.get_f64("average").ok()))
    }

    async fn list(&self, query: &ListQuery, basis: CountBasis) -> Result<ListPage, AppError> {
        query::execute(&self.collection, &QUERY_SCHEMA, query, Some(&BOOTCAMP_JOIN), basis).await
    }
}
