use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;

use crate::app::AppState;
use crate::auth::models::AuthenticatedUser;
use crate::db::models::User;
use crate::error::AppError;

/// Message for every rejected session.
pub const NOT_AUTHORIZED: &str = "Not authorized to access this route";

/// Name of the session cookie.
pub const TOKEN_COOKIE: &str = "token";

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Token from the `token` cookie.
pub fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Session cookie carrying `token`.
pub fn session_cookie(token: String, max_age_days: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(max_age_days))
        .build()
}

/// Replacement cookie that expires almost immediately.
pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, "none"))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(10))
        .build()
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

/// The signed-in user of a protected route.
///
/// The bearer header wins over the cookie. Missing, invalid or expired
/// tokens and tokens of deleted users are all rejected with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_token(&parts.headers))
            .ok_or_else(|| AppError::Auth(NOT_AUTHORIZED.to_string()))?;

        let user_id = state.tokens.verify(&token)?;

        let user = state
            .user_repo
            .find_by_id(&user_id)
            .await?
            .ok_or_else(|| AppError::Auth(NOT_AUTHORIZED.to_string()))?;

        Ok(AuthUser(user.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_bearer_token() {
        let map = headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_non_bearer_schemes_are_ignored() {
        assert!(bearer_token(&headers(&[("authorization", "Basic Zm9vOmJhcg==")])).is_none());
        assert!(bearer_token(&headers(&[("authorization", "Bearer ")])).is_none());
        assert!(bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_cookie_token() {
        let map = headers(&[("cookie", "theme=dark; token=abc.def.ghi")]);
        assert_eq!(cookie_token(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("t".into(), 30, true);
        assert_eq!(cookie.name(), TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(30)));

        let dev = session_cookie("t".into(), 30, false);
        assert_eq!(dev.secure(), Some(false));
    }

    #[test]
    fn test_expired_cookie_replaces_token() {
        let cookie = expired_session_cookie();
        assert_eq!(cookie.value(), "none");
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(10)));
    }
}
