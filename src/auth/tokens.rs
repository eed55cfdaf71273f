use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Lifetime of a password-reset token.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Hex ObjectId of the user.
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>, expire_days: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::days(expire_days),
        }
    }

    /// Sign a token for `user_id`.
    pub fn issue(&self, user_id: &ObjectId) -> Result<String, AppError> {
        self.issue_at(user_id, Utc::now())
    }

    fn issue_at(&self, user_id: &ObjectId, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = SessionClaims {
            id: user_id.to_hex(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Verify signature and expiry, returning the user id.
    pub fn verify(&self, token: &str) -> Result<ObjectId, AppError> {
        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::debug!("Rejected session token: {e}");
            AppError::Auth(crate::auth::middleware::NOT_AUTHORIZED.to_string())
        })?;

        ObjectId::parse_str(&data.claims.id)
            .map_err(|_| AppError::Auth(crate::auth::middleware::NOT_AUTHORIZED.to_string()))
    }
}

/// A freshly generated reset token: the plaintext goes to the user, only the
/// digest and expiry are stored.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub plaintext: String,
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a 20-byte random reset token valid for ten minutes.
pub fn generate_reset_token() -> ResetToken {
    let bytes: [u8; 20] = rand::random();
    let plaintext = hex::encode(bytes);
    let digest = hash_reset_token(&plaintext);

    ResetToken {
        plaintext,
        digest,
        expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
    }
}

/// SHA-256 hex digest of a reset token.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
