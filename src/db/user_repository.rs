use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOneOptions, IndexOptions, ReturnDocument};
use mongodb::IndexModel;

use crate::db::models::User;
use crate::db::query::{
    self, CountBasis, FieldKind, FieldSpec, ListPage, ListQuery, QuerySchema, EQUALITY, RANGE,
};
use crate::error::AppError;

pub const COLLECTION: &str = "users";

/// Fields that only credential lookups may load.
pub const SECRET_FIELDS: &[&str] = &["password", "resetPasswordToken", "resetPasswordExpire"];

pub const QUERY_SCHEMA: QuerySchema = QuerySchema {
    filters: &[
        FieldSpec::new("name", FieldKind::String, EQUALITY),
        FieldSpec::new("email", FieldKind::String, EQUALITY),
        FieldSpec::new("role", FieldKind::String, EQUALITY),
        FieldSpec::new("createdAt", FieldKind::Date, RANGE),
    ],
    fields: &["name", "email", "role", "createdAt"],
    hidden: SECRET_FIELDS,
};

fn without_secrets() -> Document {
    SECRET_FIELDS.iter().map(|f| (f.to_string(), 0.into())).collect()
}

/// Repository trait for user accounts.
///
/// Reads return users without their secrets unless the method says otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create the unique email index.
    async fn ensure_indexes(&self) -> Result<(), AppError>;

    async fn insert(&self, user: &User) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<User>, AppError>;

    /// Includes the password hash.
    async fn find_with_password(&self, id: &ObjectId) -> Result<Option<User>, AppError>;

    /// Includes the password hash.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// User holding `digest` as an unexpired reset token.
    async fn find_by_reset_token(
        &self,
        digest: &str,
        now: DateTime,
    ) -> Result<Option<User>, AppError>;

    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<User>, AppError>;

    async fn delete(&self, id: &ObjectId) -> Result<(), AppError>;

    async fn list(&self, query: &ListQuery, basis: CountBasis) -> Result<ListPage, AppError>;
}

/// MongoDB implementation of the UserRepository.
pub struct MongoUserRepository {
    collection: mongodb::Collection<User>,
}

impl MongoUserRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(COLLECTION),
        }
    }

    async fn find_redacted(&self, filter: Document) -> Result<Option<User>, AppError> {
        let options = FindOneOptions::builder().projection(without_secrets()).build();
        Ok(self.collection.find_one(filter).with_options(options).await?)
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn ensure_indexes(&self) -> Result<(), AppError> {
        let unique_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.collection.create_index(unique_email).await?;
        Ok(())
    }

    async fn insert(&self, user: &User) -> Result<(), AppError> {
        self.collection.insert_one(user).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<User>, AppError> {
        self.find_redacted(doc! { "_id": id }).await
    }

    async fn find_with_password(&self, id: &ObjectId) -> Result<Option<User>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    async fn find_by_reset_token(
        &self,
        digest: &str,
        now: DateTime,
    ) -> Result<Option<User>, AppError> {
        let filter = doc! {
            "resetPasswordToken": digest,
            "resetPasswordExpire": { "$gt": now },
        };
        Ok(self.collection.find_one(filter).await?)
    }

    async fn update(&self, id: &ObjectId, update: Document) -> Result<Option<User>, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .projection(without_secrets())
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
        query::execute(&self.collection, &QUERY_SCHEMA, query, None, basis).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_projection() {
        assert_eq!(
            without_secrets(),
            doc! { "password": 0, "resetPasswordToken": 0, "resetPasswordExpire": 0 }
        );
    }

    #[test]
    fn test_listing_hides_secrets() {
        let query = ListQuery::parse(None, &QUERY_SCHEMA).unwrap();
        let pipeline = query.pipeline(&QUERY_SCHEMA, None);
        assert_eq!(
            pipeline.last().unwrap(),
            &doc! { "$project": { "password": 0, "resetPasswordToken": 0, "resetPasswordExpire": 0 } }
        );
    }
}
