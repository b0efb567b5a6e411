//! Routes of the basic items app.

use crate::api::{with_conn, ApiError};
use crate::middleware::CurrentUser;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use classroom_items::Item;
use classroom_types::Role;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

pub fn routes() -> Router {
    Router::new()
        .route("/items", get(list_handler).post(create_handler))
        .route("/items/search", get(search_handler))
        .route(
            "/items/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/contact", post(contact_handler))
        .route("/admin", get(admin_handler))
}

pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let items = with_conn(&state, |conn| Ok(classroom_items::list_items(conn)?)).await?;
    Ok(Json(items))
}

pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ItemRequest>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let item = with_conn(&state, move |conn| {
        Ok(classroom_items::create_item(
            conn,
            &payload.name,
            &payload.description,
        )?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn search_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let query = params.q.clone();
    let results = with_conn(&state, move |conn| {
        Ok(classroom_items::search_items(conn, &query)?)
    })
    .await?;
    Ok(Json(json!({ "query": params.q, "results": results })))
}

pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Item>, ApiError> {
    let item = with_conn(&state, move |conn| Ok(classroom_items::get_item(conn, id)?)).await?;
    Ok(Json(item))
}

pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<ItemRequest>,
) -> Result<Json<Item>, ApiError> {
    let item = with_conn(&state, move |conn| {
        Ok(classroom_items::update_item(
            conn,
            id,
            &payload.name,
            &payload.description,
        )?)
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state, move |conn| Ok(classroom_items::delete_item(conn, id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn contact_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ContactRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = with_conn(&state, move |conn| {
        Ok(classroom_items::create_contact_message(
            conn,
            &payload.name,
            &payload.email,
            &payload.message,
        )?)
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Thank you for your message!" })),
    ))
}

/// Admin dashboard: contact messages and accounts.
pub async fn admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let (messages, users) = with_conn(&state, |conn| {
        Ok((
            classroom_items::list_contact_messages(conn)?,
            classroom_accounts::list_users(conn)?,
        ))
    })
    .await?;
    Ok(Json(json!({ "messages": messages, "users": users })))
}
