//! Routes of the todo app. No accounts.

use crate::api::{with_conn, ApiError};
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use classroom_todo::{Todo, TodoFilters, TodoInput, TodoList, TodoSort};
use classroom_types::TodoPriority;
use serde::Deserialize;
use std::sync::Arc;

/// Query string of `GET /todos`. Blank values mean "no filter".
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub priority: Option<String>,
    pub sort: Option<String>,
}

impl ListParams {
    fn filters(&self) -> Result<TodoFilters, ApiError> {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let priority = non_blank(&self.priority)
            .map(|p| p.parse::<TodoPriority>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(TodoFilters {
            category: non_blank(&self.category),
            tag: non_blank(&self.tag),
            priority,
        })
    }
}

pub fn routes() -> Router {
    Router::new()
        .route("/todos", get(list_handler).post(create_handler))
        .route(
            "/todos/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/todos/{id}/toggle", post(toggle_handler))
}

pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<TodoList>, ApiError> {
    let filters = params.filters()?;
    let sort = TodoSort::from_param(params.sort.as_deref());
    let list = with_conn(&state, move |conn| {
        Ok(classroom_todo::list_todos(conn, &filters, sort)?)
    })
    .await?;
    Ok(Json(list))
}

pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(input): Json<TodoInput>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let todo = with_conn(&state, move |conn| Ok(classroom_todo::create_todo(conn, &input)?)).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, ApiError> {
    let todo = with_conn(&state, move |conn| Ok(classroom_todo::get_todo(conn, id)?)).await?;
    Ok(Json(todo))
}

pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(input): Json<TodoInput>,
) -> Result<Json<Todo>, ApiError> {
    let todo = with_conn(&state, move |conn| {
        Ok(classroom_todo::update_todo(conn, id, &input)?)
    })
    .await?;
    Ok(Json(todo))
}

pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state, move |conn| Ok(classroom_todo::delete_todo(conn, id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, ApiError> {
    let todo = with_conn(&state, move |conn| Ok(classroom_todo::toggle_todo(conn, id)?)).await?;
    Ok(Json(todo))
}
