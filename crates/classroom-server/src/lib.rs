//! Classroom server library logic.
//!
//! One process serves one app. [`app`] assembles the router for the
//! configured [`AppKind`]: the app's own routes, the account routes and
//! session middleware when the app has accounts, `/health`, and static
//! serving of uploads for the apps that accept files.

pub mod api;
pub mod api_auth;
pub mod api_blog;
pub mod api_forum;
pub mod api_helpdesk;
pub mod api_items;
pub mod api_starter;
pub mod api_store;
pub mod api_todo;
pub mod api_tracker;
pub mod background;
pub mod config;
pub mod middleware;
pub mod uploads;

use axum::{extract::DefaultBodyLimit, routing::get, Extension, Json, Router};
use classroom_accounts::AccountError;
use classroom_blog::BlogError;
use classroom_db::{DbPool, MigrationError};
use classroom_types::AppKind;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// The app this process serves.
    pub kind: AppKind,
    /// Directory for uploaded files.
    pub upload_dir: PathBuf,
    /// Body limit for upload routes.
    pub max_upload_bytes: usize,
    /// Login session lifetime in seconds; 0 disables expiry.
    pub session_ttl_secs: u64,
}

/// Default login session lifetime (2 hours).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 2 * 60 * 60;

impl AppState {
    pub fn new(pool: DbPool, kind: AppKind, upload_dir: PathBuf, max_upload_bytes: usize) -> Self {
        Self {
            pool,
            kind,
            upload_dir,
            max_upload_bytes,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }

    pub fn with_session_ttl(mut self, secs: u64) -> Self {
        self.session_ttl_secs = secs;
        self
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to get database connection: {0}")]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("failed to seed admin account: {0}")]
    Account(#[from] AccountError),
    #[error("failed to seed blog content: {0}")]
    Blog(#[from] BlogError),
}

/// Applies the app's migrations and seeds the default admin account (and,
/// for the blog, the welcome post). Safe to run on every start.
///
/// Returns the number of migrations applied.
pub fn prepare_database(
    pool: &DbPool,
    kind: AppKind,
    seed: &config::SeedConfig,
) -> Result<usize, StartupError> {
    let conn = pool.get()?;
    let applied = classroom_db::run_migrations(&conn, kind)?;

    if kind.has_accounts() {
        classroom_accounts::ensure_admin(
            &conn,
            &seed.admin_username,
            &seed.admin_email,
            &seed.admin_password,
        )?;
    }
    if kind == AppKind::Blog {
        if let Some(admin) = classroom_accounts::find_by_username(&conn, &seed.admin_username)? {
            classroom_blog::seed_welcome_post(&conn, admin.id)?;
        }
    }

    Ok(applied)
}

/// Maximum request body size (2 MiB). Upload routes raise it to the
/// configured `app.max_upload_bytes`.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "app": state.kind,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router for `state.kind`.
pub fn app(state: AppState) -> Router {
    let kind = state.kind;
    let upload_limit = state.max_upload_bytes;

    let routes = match kind {
        AppKind::Items => api_items::routes(),
        AppKind::Helpdesk => api_helpdesk::routes(),
        AppKind::Blog => api_blog::routes(upload_limit),
        AppKind::Store => api_store::routes(),
        AppKind::Todo => api_todo::routes(),
        AppKind::Tracker => api_tracker::routes(),
        AppKind::Forum => api_forum::routes(upload_limit),
        AppKind::Starter => api_starter::routes(),
    };

    let router = if kind.has_accounts() {
        routes
            .merge(api_auth::routes())
            .layer(axum::middleware::from_fn(middleware::session_middleware))
    } else {
        routes
    };

    let router = router.route("/health", get(health));

    // Serve uploaded files under /uploads/*
    let router = if matches!(kind, AppKind::Blog | AppKind::Forum) {
        tracing::info!(path = %state.upload_dir.display(), "serving uploaded files at /uploads");
        router.nest_service("/uploads", ServeDir::new(&state.upload_dir))
    } else {
        router
    };

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state(dir: &tempfile::TempDir, kind: AppKind) -> AppState {
        let path = dir.path().join("test.db");
        let pool = classroom_db::create_pool(
            path.to_str().unwrap(),
            classroom_db::DbRuntimeSettings::default(),
        )
        .unwrap();
        prepare_database(&pool, kind, &config::SeedConfig::default()).unwrap();
        AppState::new(pool, kind, dir.path().join("uploads"), 1024 * 1024)
    }

    #[tokio::test]
    async fn health_check_reports_app() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state(&dir, AppKind::Tracker));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["app"], "tracker");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn apps_without_accounts_have_no_auth_routes() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state(&dir, AppKind::Todo));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"admin","password":"admin123"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn prepare_database_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.db");
        let pool = classroom_db::create_pool(
            path.to_str().unwrap(),
            classroom_db::DbRuntimeSettings::default(),
        )
        .unwrap();
        let seed = config::SeedConfig::default();

        assert!(prepare_database(&pool, AppKind::Blog, &seed).unwrap() > 0);
        assert_eq!(prepare_database(&pool, AppKind::Blog, &seed).unwrap(), 0);

        let conn = pool.get().unwrap();
        let (users, posts): (i64, i64) = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM users), (SELECT COUNT(*) FROM posts)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((users, posts), (1, 1));
    }
}
