use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use classroom_accounts::{session_user, SessionUser};
use classroom_types::Role;
use std::sync::Arc;

use crate::api::ApiError;
use crate::AppState;

/// Name of the cookie carrying the login session token.
pub const SESSION_COOKIE: &str = "classroom_session";

/// The logged-in user of a request, if any. Inserted into the request
/// extensions by [`session_middleware`].
#[derive(Clone, Debug, Default)]
pub struct CurrentUser(pub Option<SessionUser>);

impl CurrentUser {
    /// The user, or `401` for anonymous requests.
    pub fn require(&self) -> Result<&SessionUser, ApiError> {
        self.0
            .as_ref()
            .ok_or_else(|| ApiError::Unauthorized("Please log in to access this page.".to_string()))
    }

    /// The user, `401` when anonymous, `403` when their role is not in
    /// `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<&SessionUser, ApiError> {
        let user = self.require()?;
        if roles.contains(&user.role) {
            Ok(user)
        } else {
            Err(ApiError::Forbidden("Access denied.".to_string()))
        }
    }

    pub fn optional(&self) -> Option<&SessionUser> {
        self.0.as_ref()
    }
}

/// Extracts the session token from the `classroom_session` cookie or an
/// `Authorization: Bearer` header. The cookie wins when both are present.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().trim().to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

/// The `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// A cookie with matching path, for clearing the session cookie with
/// [`CookieJar::remove`].
pub fn session_cookie_removal() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Resolves the session token of every request into a [`CurrentUser`].
///
/// Anonymous requests pass through with `CurrentUser(None)`; handlers
/// decide whether they need a login. Unknown tokens, and tokens older than
/// `AppState::session_ttl_secs`, are treated as anonymous.
pub async fn session_middleware(mut req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let token = session_token(req.headers());

    let user = match token {
        Some(token) => {
            let state = req
                .extensions()
                .get::<Arc<AppState>>()
                .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
                .clone();

            tokio::task::spawn_blocking(move || {
                let conn = state
                    .pool
                    .get()
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
                session_user(&conn, &token, state.session_ttl_secs).map_err(|e| {
                    tracing::error!(error = %e, "session lookup failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                })
            })
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??
        }
        None => None,
    };

    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(role: Role) -> CurrentUser {
        CurrentUser(Some(SessionUser {
            id: 1,
            username: "ann".to_string(),
            role,
        }))
    }

    #[test]
    fn token_from_cookie_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; classroom_session=abc-123"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc-123"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(session_token(&headers), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn session_cookie_is_http_only_and_site_wide() {
        let cookie = session_cookie("abc-123".to_string());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc-123");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(session_cookie_removal().path(), Some("/"));
    }

    #[test]
    fn guards_check_login_and_role() {
        assert!(matches!(
            CurrentUser(None).require(),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(user(Role::User).require().is_ok());
        assert!(matches!(
            user(Role::User).require_role(&[Role::Admin]),
            Err(ApiError::Forbidden(_))
        ));
        assert!(user(Role::Agent)
            .require_role(&[Role::Agent, Role::Admin])
            .is_ok());
    }
}
