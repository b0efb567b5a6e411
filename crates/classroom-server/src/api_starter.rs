//! Routes of the starter template. Every item route is scoped to the
//! logged-in owner.

use crate::api::{with_conn, ApiError};
use crate::middleware::CurrentUser;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    routing::get,
    Router,
};
use classroom_starter::{Category, Counts, Item, ItemFilters, ItemInput, Tag};
use std::sync::Arc;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/items", get(list_handler).post(create_handler))
        .route(
            "/items/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/categories", get(categories_handler))
        .route("/tags", get(tags_handler))
}

pub async fn home_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Counts>, ApiError> {
    let owner = current.require()?.id;
    let counts = with_conn(&state, move |conn| Ok(classroom_starter::counts(conn, owner)?)).await?;
    Ok(Json(counts))
}

pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(filters): Query<ItemFilters>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let owner = current.require()?.id;
    let items = with_conn(&state, move |conn| {
        Ok(classroom_starter::list_items(conn, owner, &filters)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(input): Json<ItemInput>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let owner = current.require()?.id;
    let item = with_conn(&state, move |conn| {
        Ok(classroom_starter::create_item(conn, owner, &input)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Item>, ApiError> {
    let owner = current.require()?.id;
    let item =
        with_conn(&state, move |conn| Ok(classroom_starter::get_item(conn, owner, id)?)).await?;
    Ok(Json(item))
}

pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(input): Json<ItemInput>,
) -> Result<Json<Item>, ApiError> {
    let owner = current.require()?.id;
    let item = with_conn(&state, move |conn| {
        Ok(classroom_starter::update_item(conn, owner, id, &input)?)
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let owner = current.require()?.id;
    with_conn(&state, move |conn| Ok(classroom_starter::delete_item(conn, owner, id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn categories_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Category>>, ApiError> {
    current.require()?;
    let categories =
        with_conn(&state, |conn| Ok(classroom_starter::list_categories(conn)?)).await?;
    Ok(Json(categories))
}

pub async fn tags_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    current.require()?;
    let tags = with_conn(&state, |conn| Ok(classroom_starter::list_tags(conn)?)).await?;
    Ok(Json(tags))
}
