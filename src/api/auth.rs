use axum::extract::{Path, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::CookieJar;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime};
use serde::Deserialize;
use validator::Validate;

use crate::api::bootcamps::clean;
use crate::api::extract::ApiJson;
use crate::api::response::ApiResponse;
use crate::api::users::{insert_user, CreateUserRequest, UpdateUserRequest};
use crate::app::AppState;
use crate::auth::middleware::{expired_session_cookie, session_cookie, AuthUser};
use crate::auth::models::{AuthenticatedUser, Role};
use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
use crate::auth::tokens::{generate_reset_token, hash_reset_token};
use crate::db::models::User;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;
use crate::mail::client::{MailMessage, Mailer};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Body of `PUT /auth/updatedetails`. Only name and email may change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDetailsRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(
        required(message = "Please add a password"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: Option<String>,
}

/// Create a `user` or `publisher` account.
pub async fn process_register(
    users: &dyn UserRepository,
    request: RegisterRequest,
) -> Result<User, AppError> {
    let role = request.role.unwrap_or_default();
    if !role.is_self_assignable() {
        return Err(AppError::BadRequest(format!(
            "Role \"{role}\" can not be self-assigned"
        )));
    }

    insert_user(
        users,
        CreateUserRequest {
            name: request.name,
            email: request.email,
            password: request.password,
            role: Some(role),
        },
    )
    .await
}

/// Check credentials. Unknown emails and wrong passwords fail identically.
pub async fn process_login(
    users: &dyn UserRepository,
    request: LoginRequest,
) -> Result<User, AppError> {
    let (Some(email), Some(password)) = (clean(request.email), request.password) else {
        return Err(AppError::BadRequest(
            "Please provide an email and password".into(),
        ));
    };
    if password.is_empty() {
        return Err(AppError::BadRequest(
            "Please provide an email and password".into(),
        ));
    }

    let user = users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.into()))?;

    let matches = user
        .password
        .as_deref()
        .is_some_and(|hash| verify_password(&password, hash));
    if !matches {
        return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
    }

    Ok(user.redacted())
}

pub async fn process_update_details(
    users: &dyn UserRepository,
    actor: &AuthenticatedUser,
    request: UpdateDetailsRequest,
) -> Result<User, AppError> {
    let request = UpdateUserRequest {
        name: request.name,
        email: request.email,
        role: None,
    };
    request.validate()?;

    let update = request.into_update()?;
    let user = if update.is_empty() {
        users.find_by_id(&actor.id).await?
    } else {
        users.update(&actor.id, update).await?
    };
    user.ok_or_else(|| AppError::Auth(crate::auth::middleware::NOT_AUTHORIZED.into()))
}

pub async fn process_update_password(
    users: &dyn UserRepository,
    actor: &AuthenticatedUser,
    request: UpdatePasswordRequest,
) -> Result<User, AppError> {
    let current = request.current_password.unwrap_or_default();
    let new_password = request.new_password.unwrap_or_default();
    if new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(vec![
            "Password must be at least 6 characters".into(),
        ]));
    }

    let user = users
        .find_with_password(&actor.id)
        .await?
        .ok_or_else(|| AppError::Auth(crate::auth::middleware::NOT_AUTHORIZED.into()))?;

    let matches = user
        .password
        .as_deref()
        .is_some_and(|hash| verify_password(&current, hash));
    if !matches {
        return Err(AppError::Auth("Password is incorrect".into()));
    }

    let hash = hash_password(&new_password)?;
    users
        .update(&actor.id, doc! { "$set": { "password": hash } })
        .await?
        .ok_or_else(|| AppError::Auth(crate::auth::middleware::NOT_AUTHORIZED.into()))
}

/// Store a fresh reset token digest and mail the plaintext link.
///
/// `origin` is `<scheme>://<host>` of the incoming request.
pub async fn process_forgot_password(
    users: &dyn UserRepository,
    mailer: &dyn Mailer,
    origin: &str,
    request: ForgotPasswordRequest,
) -> Result<(), AppError> {
    let email = clean(request.email).unwrap_or_default();
    let user = users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with that email".into()))?;

    let token = generate_reset_token();
    users
        .update(
            &user.id,
            doc! { "$set": {
                "resetPasswordToken": token.digest.as_str(),
                "resetPasswordExpire": DateTime::from_chrono(token.expires_at),
            } },
        )
        .await?;

    let reset_url = format!("{origin}/api/v1/auth/resetpassword/{}", token.plaintext);
    let message = MailMessage {
        to: user.email.clone(),
        subject: "Password reset token".into(),
        text: format!(
            "You are receiving this email because you (or someone else) has requested \
             the reset of a password. Please make a PUT request to: \n\n {reset_url}"
        ),
    };

    if let Err(err) = mailer.send(&message).await {
        tracing::error!(user_id = %user.id, "Reset email failed: {err}");
        clear_reset_token(users, &user.id).await;
        return Err(err);
    }

    tracing::info!(user_id = %user.id, "Reset email sent");
    Ok(())
}

async fn clear_reset_token(users: &dyn UserRepository, id: &ObjectId) {
    let update = doc! { "$unset": { "resetPasswordToken": "", "resetPasswordExpire": "" } };
    if let Err(err) = users.update(id, update).await {
        tracing::warn!(user_id = %id, "Failed to clear reset token: {err}");
    }
}

/// Redeem a reset token. Tokens are single use.
pub async fn process_reset_password(
    users: &dyn UserRepository,
    token: &str,
    request: ResetPasswordRequest,
) -> Result<User, AppError> {
    let digest = hash_reset_token(token);
    let user = users
        .find_by_reset_token(&digest, DateTime::now())
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid token".into()))?;

    request.validate()?;
    let Some(password) = request.password else {
        return Err(AppError::Internal("Validated password is missing".into()));
    };

    let hash = hash_password(&password)?;
    let update = doc! {
        "$set": { "password": hash },
        "$unset": { "resetPasswordToken": "", "resetPasswordExpire": "" },
    };
    users
        .update(&user.id, update)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid token".into()))
}

/// `<scheme>://<host>` of the request, honouring `X-Forwarded-Proto`.
pub fn request_origin(headers: &HeaderMap) -> String {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{scheme}://{host}")
}

/// `{ success, token }` plus the session cookie.
fn token_response(
    state: &AppState,
    jar: CookieJar,
    user: &User,
    status: StatusCode,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse>), AppError> {
    let token = state.tokens.issue(&user.id)?;
    let cookie = session_cookie(
        token.clone(),
        state.settings.jwt_cookie_expire_days,
        state.settings.is_production(),
    );
    Ok((status, jar.add(cookie), Json(ApiResponse::token(token))))
}

/// `POST /api/v1/auth/register`
pub async fn register_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse>), AppError> {
    let user = process_register(state.user_repo.as_ref(), request).await?;
    token_response(&state, jar, &user, StatusCode::OK)
}

/// `POST /api/v1/auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse>), AppError> {
    let user = process_login(state.user_repo.as_ref(), request).await?;
    token_response(&state, jar, &user, StatusCode::OK)
}

/// `GET /api/v1/auth/logout`
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Json<ApiResponse>) {
    (jar.add(expired_session_cookie()), Json(ApiResponse::empty()))
}

/// `GET /api/v1/auth/me`
pub async fn me_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<ApiResponse>, AppError> {
    let user = state
        .user_repo
        .find_by_id(&actor.id)
        .await?
        .ok_or_else(|| AppError::Auth(crate::auth::middleware::NOT_AUTHORIZED.into()))?;
    Ok(Json(ApiResponse::model(&user)?))
}

/// `PUT /api/v1/auth/updatedetails`
pub async fn update_details_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<UpdateDetailsRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let user = process_update_details(state.user_repo.as_ref(), &actor, request).await?;
    Ok(Json(ApiResponse::model(&user)?))
}

/// `PUT /api/v1/auth/updatepassword`
pub async fn update_password_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    jar: CookieJar,
    ApiJson(request): ApiJson<UpdatePasswordRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse>), AppError> {
    let user = process_update_password(state.user_repo.as_ref(), &actor, request).await?;
    token_response(&state, jar, &user, StatusCode::OK)
}

/// `POST /api/v1/auth/forgotpassword`
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    process_forgot_password(
        state.user_repo.as_ref(),
        state.mailer.as_ref(),
        &request_origin(&headers),
        request,
    )
    .await?;
    Ok(Json(ApiResponse::message("Email sent")))
}

/// `PUT /api/v1/auth/resetpassword/{token}`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    jar: CookieJar,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse>), AppError> {
    let user = process_reset_password(state.user_repo.as_ref(), &token, request).await?;
    token_response(&state, jar, &user, StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::user_repository::MockUserRepository;
    use crate::mail::client::MockMailer;
    use axum::http::HeaderValue;

    fn stored_user(password: &str) -> User {
        User {
            id: ObjectId::new(),
            name: "John Doe".to_string(),
            email: "john@gmail.com".to_string(),
            role: Role::User,
            password: Some(hash_password(password).unwrap()),
            reset_password_token: None,
            reset_password_expire: None,
            created_at: DateTime::now(),
        }
    }

    fn actor_for(user: &User) -> AuthenticatedUser {
        user.clone().into()
    }

    #[tokio::test]
    async fn test_admin_cannot_self_register() {
        let mut users = MockUserRepository::new();
        users.expect_insert().never();

        let err = process_register(
            &users,
            RegisterRequest {
                name: Some("Mallory".into()),
                email: Some("mallory@gmail.com".into()),
                password: Some("123456".into()),
                role: Some(Role::Admin),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_register_defaults_to_user_role() {
        let mut users = MockUserRepository::new();
        users
            .expect_insert()
            .withf(|u| u.role == Role::User)
            .times(1)
            .returning(|_| Ok(()));

        let user = process_register(
            &users,
            RegisterRequest {
                name: Some("John Doe".into()),
                email: Some("john@gmail.com".into()),
                password: Some("123456".into()),
                role: None,
            },
        )
        .await
        .unwrap();
        assert!(user.password.is_none());
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let err = process_login(
            &MockUserRepository::new(),
            LoginRequest {
                email: Some("john@gmail.com".into()),
                password: None,
            },
        )
        .await
        .unwrap_err();

        match err {
            AppError::BadRequest(msg) => assert_eq!(msg, "Please provide an email and password"),
            other => panic!("Expected BadRequest, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_look_the_same() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .withf(|email| email == "nobody@gmail.com")
            .returning(|_| Ok(None));
        let user = stored_user("123456");
        users
            .expect_find_by_email()
            .withf(|email| email == "john@gmail.com")
            .returning(move |_| Ok(Some(user.clone())));

        let unknown = process_login(
            &users,
            LoginRequest {
                email: Some("nobody@gmail.com".into()),
                password: Some("123456".into()),
            },
        )
        .await
        .unwrap_err();
        let wrong = process_login(
            &users,
            LoginRequest {
                email: Some("john@gmail.com".into()),
                password: Some("654321".into()),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(unknown.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.public_message(), wrong.public_message());
    }

    #[tokio::test]
    async fn test_update_password_checks_current() {
        let user = stored_user("123456");
        let actor = actor_for(&user);

        let mut users = MockUserRepository::new();
        users
            .expect_find_with_password()
            .returning(move |_| Ok(Some(user.clone())));
        users.expect_update().never();

        let err = process_update_password(
            &users,
            &actor,
            UpdatePasswordRequest {
                current_password: Some("wrong1".into()),
                new_password: Some("1234567".into()),
            },
        )
        .await
        .unwrap_err();

        match err {
            AppError::Auth(msg) => assert_eq!(msg, "Password is incorrect"),
            other => panic!("Expected Auth, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forgot_password_mails_reset_link() {
        let user = stored_user("123456");
        let id = user.id;

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .returning(move |_| Ok(Some(user.clone())));
        users
            .expect_update()
            .withf(move |target, update| {
                *target == id
                    && update
                        .get_document("$set")
                        .is_ok_and(|set| set.get_str("resetPasswordToken").is_ok())
            })
            .times(1)
            .returning(|_, _| Ok(None));

        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|m| {
                m.to == "john@gmail.com"
                    && m.text
                        .contains("https://devcamper.io/api/v1/auth/resetpassword/")
            })
            .times(1)
            .returning(|_| Ok(()));

        process_forgot_password(
            &users,
            &mailer,
            "https://devcamper.io",
            ForgotPasswordRequest {
                email: Some("john@gmail.com".into()),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_failed_mail_clears_reset_fields() {
        let user = stored_user("123456");

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .returning(move |_| Ok(Some(user.clone())));
        users
            .expect_update()
            .withf(|_, update| update.contains_key("$set"))
            .times(1)
            .returning(|_, _| Ok(None));
        users
            .expect_update()
            .withf(|_, update| update.contains_key("$unset"))
            .times(1)
            .returning(|_, _| Ok(None));

        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .returning(|_| Err(AppError::Mail("connection refused".into())));

        let err = process_forgot_password(
            &users,
            &mailer,
            "http://localhost:5000",
            ForgotPasswordRequest {
                email: Some("john@gmail.com".into()),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.public_message(), "Email could not be sent");
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| Ok(None));

        let err = process_forgot_password(
            &users,
            &MockMailer::new(),
            "http://localhost",
            ForgotPasswordRequest {
                email: Some("ghost@gmail.com".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_with_unknown_token() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_reset_token()
            .returning(|_, _| Ok(None));

        let err = process_reset_password(
            &users,
            "deadbeef",
            ResetPasswordRequest {
                password: Some("1234567".into()),
            },
        )
        .await
        .unwrap_err();

        match err {
            AppError::BadRequest(msg) => assert_eq!(msg, "Invalid token"),
            other => panic!("Expected BadRequest, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reset_clears_token_fields() {
        let user = stored_user("123456");
        let redacted = user.redacted();
        let digest = hash_reset_token("plain-token");

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_reset_token()
            .withf(move |d, _| d == digest)
            .returning(move |_, _| Ok(Some(user.clone())));
        users
            .expect_update()
            .withf(|_, update| {
                update.get_document("$unset").is_ok_and(|u| {
                    u.contains_key("resetPasswordToken") && u.contains_key("resetPasswordExpire")
                })
            })
            .times(1)
            .returning(move |_, _| Ok(Some(redacted.clone())));

        process_reset_password(
            &users,
            "plain-token",
            ResetPasswordRequest {
                password: Some("1234567".into()),
            },
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_request_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("api.devcamper.io"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(request_origin(&headers), "https://api.devcamper.io");

        assert_eq!(request_origin(&HeaderMap::new()), "http://localhost");
    }
}
