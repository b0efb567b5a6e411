#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use classroom_db::{create_pool, DbPool, DbRuntimeSettings};
use classroom_server::{app, config::SeedConfig, prepare_database, AppState};
use classroom_types::AppKind;
use serde_json::Value;
use std::path::PathBuf;
use tower::ServiceExt; // for oneshot

pub const ADMIN_PASSWORD: &str = "admin123";

/// A router over a fresh SQLite file. Uses a temp directory because every
/// `:memory:` pool connection would see its own empty database.
pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub upload_dir: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new(kind: AppKind) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.db");
        let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        prepare_database(&pool, kind, &SeedConfig::default()).unwrap();

        let upload_dir = dir.path().join("uploads");
        let state = AppState::new(pool.clone(), kind, upload_dir.clone(), 1024 * 1024);
        Self {
            router: app(state),
            pool,
            upload_dir,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    /// Logs in and returns the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/login",
                None,
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login("admin", ADMIN_PASSWORD).await
    }

    /// Registers through `/auth/register` and logs in.
    pub async fn register_and_login(&self, username: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                serde_json::json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "password1",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        self.login(username, "password1").await
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }
}

/// Builds a multipart body with one file field.
pub fn multipart_file(
    uri: &str,
    token: &str,
    field: &str,
    filename: &str,
    content: &[u8],
) -> Request<Body> {
    let boundary = "classroom-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}
