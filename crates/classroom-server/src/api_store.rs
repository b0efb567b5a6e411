//! Routes of the school store app. Every route needs a staff or admin
//! login; the admin dashboard is admin only.

use crate::api::{with_conn, ApiError};
use crate::middleware::CurrentUser;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use classroom_store::money::format_cents;
use classroom_store::{
    AdminStats, Analytics, Category, CheckoutRequest, Dashboard, DateRange, Product, ProductInput,
};
use classroom_types::Role;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const STORE_ROLES: &[Role] = &[Role::Staff, Role::Admin];

#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    pub search: Option<String>,
    pub category_id: Option<i64>,
}

pub fn routes() -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/products", get(list_handler).post(create_handler))
        .route("/products/{id}", get(get_handler).put(update_handler))
        .route("/pos", get(pos_handler))
        .route("/pos/checkout", post(checkout_handler))
        .route("/analytics", get(analytics_handler))
        .route("/categories", get(categories_handler))
        .route("/admin", get(admin_handler))
}

pub async fn dashboard_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Dashboard>, ApiError> {
    current.require_role(STORE_ROLES)?;
    let dashboard = with_conn(&state, |conn| Ok(classroom_store::dashboard(conn)?)).await?;
    Ok(Json(dashboard))
}

pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<ProductParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    current.require_role(STORE_ROLES)?;
    let products = with_conn(&state, move |conn| {
        Ok(classroom_store::list_products(
            conn,
            params.search.as_deref(),
            params.category_id,
        )?)
    })
    .await?;
    Ok(Json(products))
}

pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    current.require_role(STORE_ROLES)?;
    let product =
        with_conn(&state, move |conn| Ok(classroom_store::create_product(conn, &input)?)).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    current.require_role(STORE_ROLES)?;
    let product = with_conn(&state, move |conn| Ok(classroom_store::get_product(conn, id)?)).await?;
    Ok(Json(product))
}

pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>, ApiError> {
    current.require_role(STORE_ROLES)?;
    let product = with_conn(&state, move |conn| {
        Ok(classroom_store::update_product(conn, id, &input)?)
    })
    .await?;
    Ok(Json(product))
}

/// Handler for `GET /pos`: products in stock plus the category list.
pub async fn pos_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    current.require_role(STORE_ROLES)?;
    let (products, categories) = with_conn(&state, |conn| {
        Ok((
            classroom_store::pos_products(conn)?,
            classroom_store::list_categories(conn)?,
        ))
    })
    .await?;
    Ok(Json(json!({ "products": products, "categories": categories })))
}

pub async fn checkout_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<Value>, ApiError> {
    let cashier = current.require_role(STORE_ROLES)?.clone();
    let receipt = with_conn(&state, move |conn| {
        Ok(classroom_store::checkout(conn, &cashier, &request)?)
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "sale_id": receipt.sale_id,
        "transaction_id": receipt.transaction_id,
        "total_cents": receipt.total_cents,
        "total": format_cents(receipt.total_cents),
    })))
}

pub async fn analytics_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(range): Query<DateRange>,
) -> Result<Json<Analytics>, ApiError> {
    current.require_role(STORE_ROLES)?;
    let analytics =
        with_conn(&state, move |conn| Ok(classroom_store::analytics(conn, &range)?)).await?;
    Ok(Json(analytics))
}

pub async fn categories_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Category>>, ApiError> {
    current.require_role(STORE_ROLES)?;
    let categories = with_conn(&state, |conn| Ok(classroom_store::list_categories(conn)?)).await?;
    Ok(Json(categories))
}

pub async fn admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<AdminStats>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let stats = with_conn(&state, |conn| Ok(classroom_store::admin_stats(conn)?)).await?;
    Ok(Json(stats))
}
