//! Account routes shared by every app with logins: registration, login,
//! logout, and admin user management.

use crate::api::{with_conn, ApiError};
use crate::middleware::{session_cookie, session_cookie_removal, session_token, CurrentUser};
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use classroom_accounts::{NewUser, SessionUser, User, UserUpdate};
use classroom_types::{AppKind, Role};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Request body for `POST /auth/register` and `POST /admin/users`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(flatten)]
    pub user: NewUser,
    /// Requested role. Must be one the app offers; defaults to the app's
    /// first registration role.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUser,
}

pub fn routes() -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .route(
            "/admin/users",
            get(list_users_handler).post(create_user_handler),
        )
        .route(
            "/admin/users/{id}",
            get(get_user_handler).patch(update_user_handler),
        )
}

fn ensure_app_role(kind: AppKind, role: Role) -> Result<(), ApiError> {
    if kind.roles().contains(&role) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("role not available in this app: {role}")))
    }
}

/// Handler for `POST /auth/register`.
pub async fn register_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let allowed = state.kind.registration_roles();
    let role = match (payload.role, allowed.first()) {
        (_, None) => {
            return Err(ApiError::Forbidden(
                "Registration is closed. Ask an administrator for an account.".to_string(),
            ))
        }
        (Some(role), Some(_)) if allowed.contains(&role) => role,
        (Some(role), Some(_)) => {
            return Err(ApiError::BadRequest(format!("cannot register as {role}")))
        }
        (None, Some(&default)) => default,
    };

    let user = with_conn(&state, move |conn| {
        Ok(classroom_accounts::register(conn, &payload.user, role)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Handler for `POST /auth/login`.
///
/// Sets the session cookie and also returns the token for clients that
/// prefer `Authorization: Bearer`.
pub async fn login_handler(
    Extension(state): Extension<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let login = with_conn(&state, move |conn| {
        let user = classroom_accounts::authenticate(conn, &payload.username, &payload.password)?
            .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;
        let token = classroom_accounts::create_session(conn, user.id)?;
        Ok(LoginResponse {
            token,
            user: SessionUser {
                id: user.id,
                username: user.username,
                role: user.role,
            },
        })
    })
    .await?;

    tracing::info!(user_id = login.user.id, username = %login.user.username, "user logged in");
    let jar = jar.add(session_cookie(login.token.clone()));
    Ok((jar, Json(login)).into_response())
}

/// Handler for `POST /auth/logout`. Succeeds even without a session.
pub async fn logout_handler(
    Extension(state): Extension<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers) {
        with_conn(&state, move |conn| {
            Ok(classroom_accounts::end_session(conn, &token)?)
        })
        .await?;
    }
    Ok((
        jar.remove(session_cookie_removal()),
        Json(json!({ "message": "You have been logged out." })),
    )
        .into_response())
}

/// Handler for `GET /auth/me`.
pub async fn me_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<User>, ApiError> {
    let id = current.require()?.id;
    let user = with_conn(&state, move |conn| Ok(classroom_accounts::get_user(conn, id)?)).await?;
    Ok(Json(user))
}

/// Handler for `GET /admin/users`.
pub async fn list_users_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let users = with_conn(&state, |conn| Ok(classroom_accounts::list_users(conn)?)).await?;
    Ok(Json(json!({ "users": users })))
}

/// Handler for `POST /admin/users`. Admins may create any role the app
/// has, including staff accounts that cannot self-register.
pub async fn create_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    current.require_role(&[Role::Admin])?;
    let role = match payload.role {
        Some(role) => role,
        None => *state
            .kind
            .roles()
            .first()
            .ok_or_else(|| ApiError::NotFound("this app has no accounts".to_string()))?,
    };
    ensure_app_role(state.kind, role)?;

    let user = with_conn(&state, move |conn| {
        Ok(classroom_accounts::register(conn, &payload.user, role)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Handler for `GET /admin/users/{id}`.
pub async fn get_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let user = with_conn(&state, move |conn| Ok(classroom_accounts::get_user(conn, id)?)).await?;
    Ok(Json(user))
}

/// Handler for `PATCH /admin/users/{id}`.
pub async fn update_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    current.require_role(&[Role::Admin])?;
    if let Some(role) = update.role {
        ensure_app_role(state.kind, role)?;
    }
    let user = with_conn(&state, move |conn| {
        Ok(classroom_accounts::update_user(conn, id, &update)?)
    })
    .await?;
    Ok(Json(user))
}
