//! Error type and database plumbing shared by every handler module.

use crate::AppState;
use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use classroom_accounts::AccountError;
use classroom_blog::BlogError;
use classroom_db::{is_constraint_violation, is_unique_violation};
use classroom_forum::ForumError;
use classroom_helpdesk::HelpdeskError;
use classroom_items::ItemError;
use classroom_starter::StarterError;
use classroom_store::StoreError;
use classroom_todo::TodoError;
use classroom_tracker::TrackerError;
use rusqlite::Connection;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        if is_unique_violation(&e) {
            ApiError::Conflict("already exists".to_string())
        } else if is_constraint_violation(&e) {
            ApiError::BadRequest(format!("constraint violation: {e}"))
        } else {
            tracing::error!(error = %e, "database error");
            ApiError::InternalServerError("database error".to_string())
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Database(e) => e.into(),
            AccountError::AlreadyExists => ApiError::Conflict(e.to_string()),
            AccountError::NotFound(_) => ApiError::NotFound(e.to_string()),
            AccountError::Validation(msg) => ApiError::BadRequest(msg),
            AccountError::PasswordHash(msg) => {
                tracing::error!(error = %msg, "password hashing failed");
                ApiError::InternalServerError("password hashing failed".to_string())
            }
        }
    }
}

impl From<ItemError> for ApiError {
    fn from(e: ItemError) -> Self {
        match e {
            ItemError::Database(e) => e.into(),
            ItemError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ItemError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<HelpdeskError> for ApiError {
    fn from(e: HelpdeskError) -> Self {
        match e {
            HelpdeskError::Database(e) => e.into(),
            HelpdeskError::NotFound(_) => ApiError::NotFound(e.to_string()),
            HelpdeskError::Forbidden(msg) => ApiError::Forbidden(msg),
            HelpdeskError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<BlogError> for ApiError {
    fn from(e: BlogError) -> Self {
        match e {
            BlogError::Database(e) => e.into(),
            BlogError::NotFound(_) => ApiError::NotFound(e.to_string()),
            BlogError::Forbidden(msg) => ApiError::Forbidden(msg),
            BlogError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => e.into(),
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::Validation(msg) => ApiError::BadRequest(msg),
            StoreError::CheckoutFailed(ref source) => {
                tracing::error!(error = %source, "checkout rolled back");
                if is_constraint_violation(source) {
                    ApiError::BadRequest(e.to_string())
                } else {
                    ApiError::InternalServerError(e.to_string())
                }
            }
        }
    }
}

impl From<TodoError> for ApiError {
    fn from(e: TodoError) -> Self {
        match e {
            TodoError::Database(e) => e.into(),
            TodoError::NotFound(_) => ApiError::NotFound(e.to_string()),
            TodoError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::Database(e) => e.into(),
            TrackerError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            TrackerError::Validation(msg) => ApiError::BadRequest(msg),
            TrackerError::InvalidDate(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<ForumError> for ApiError {
    fn from(e: ForumError) -> Self {
        match e {
            ForumError::Database(e) => e.into(),
            ForumError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            ForumError::Forbidden(msg) => ApiError::Forbidden(msg),
            ForumError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<StarterError> for ApiError {
    fn from(e: StarterError) -> Self {
        match e {
            StarterError::Database(e) => e.into(),
            StarterError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StarterError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

/// Runs `f` against a pooled connection on the blocking thread pool.
///
/// The connection goes back to the pool when `f` returns, errors, or
/// panics.
pub async fn with_conn<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_types::AppKind;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    fn unique_violation() -> rusqlite::Error {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err()
    }

    fn not_null_violation() -> rusqlite::Error {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT NOT NULL);").unwrap();
        conn.execute("INSERT INTO t VALUES (NULL)", []).unwrap_err()
    }

    #[test]
    fn database_errors_are_classified() {
        assert_eq!(status_of(unique_violation()), StatusCode::CONFLICT);
        assert_eq!(status_of(not_null_violation()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(rusqlite::Error::QueryReturnedNoRows),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(status_of(ItemError::NotFound(3)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(HelpdeskError::Forbidden("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(TrackerError::InvalidDate("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(AccountError::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            status_of(StoreError::CheckoutFailed(rusqlite::Error::InvalidQuery)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ForumError::NotFound { entity: "thread", id: 1 }),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn error_body_carries_message() {
        let response = ApiError::BadRequest("Title is required".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Title is required");
    }

    #[tokio::test]
    async fn with_conn_runs_against_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pool = classroom_db::create_pool(
            path.to_str().unwrap(),
            classroom_db::DbRuntimeSettings::default(),
        )
        .unwrap();
        let state = Arc::new(AppState::new(pool, AppKind::Todo, dir.path().join("uploads"), 1024));

        let value: i64 = with_conn(&state, |conn| {
            Ok(conn.query_row("SELECT 40 + 2", [], |row| row.get(0))?)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);

        let err = with_conn(&state, |_conn| -> Result<(), ApiError> {
            Err(ApiError::NotFound("gone".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
