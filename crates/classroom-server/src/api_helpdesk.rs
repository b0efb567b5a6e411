//! Routes of the help desk app. Every route needs a login; what a user
//! sees is scoped by role inside `classroom_helpdesk`.

use crate::api::{with_conn, ApiError};
use crate::middleware::CurrentUser;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use classroom_helpdesk::{
    AdminStats, Category, Dashboard, NewTicket, Response, Ticket, TicketDetail, TicketFilters,
    TicketUpdate, TicketUpdateOutcome,
};
use classroom_types::Role;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ResponseRequest {
    #[serde(default)]
    pub message: String,
}

pub fn routes() -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/tickets", get(list_handler).post(create_handler))
        .route("/tickets/{id}", get(get_handler).patch(update_handler))
        .route("/tickets/{id}/responses", post(respond_handler))
        .route("/categories", get(categories_handler))
        .route("/admin", get(admin_handler))
}

pub async fn dashboard_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Dashboard>, ApiError> {
    let user = current.require()?.clone();
    let dashboard = with_conn(&state, move |conn| {
        Ok(classroom_helpdesk::dashboard(conn, &user)?)
    })
    .await?;
    Ok(Json(dashboard))
}

pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(filters): Query<TicketFilters>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let user = current.require()?.clone();
    let tickets = with_conn(&state, move |conn| {
        Ok(classroom_helpdesk::list_tickets(conn, &user, &filters)?)
    })
    .await?;
    Ok(Json(tickets))
}

pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<NewTicket>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let user = current.require()?.clone();
    let ticket = with_conn(&state, move |conn| {
        Ok(classroom_helpdesk::create_ticket(conn, &user, &payload)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<TicketDetail>, ApiError> {
    let user = current.require()?.clone();
    let detail = with_conn(&state, move |conn| {
        Ok(classroom_helpdesk::get_ticket(conn, &user, id)?)
    })
    .await?;
    Ok(Json(detail))
}

pub async fn respond_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ResponseRequest>,
) -> Result<(StatusCode, Json<Response>), ApiError> {
    let user = current.require()?.clone();
    let response = with_conn(&state, move |conn| {
        Ok(classroom_helpdesk::add_response(conn, &user, id, &payload.message)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(update): Json<TicketUpdate>,
) -> Result<Json<TicketUpdateOutcome>, ApiError> {
    let user = current.require()?.clone();
    let outcome = with_conn(&state, move |conn| {
        Ok(classroom_helpdesk::update_ticket(conn, &user, id, &update)?)
    })
    .await?;
    Ok(Json(outcome))
}

pub async fn categories_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Category>>, ApiError> {
    current.require()?;
    let categories =
        with_conn(&state, |conn| Ok(classroom_helpdesk::list_categories(conn)?)).await?;
    Ok(Json(categories))
}

pub async fn admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<AdminStats>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let stats = with_conn(&state, |conn| Ok(classroom_helpdesk::admin_stats(conn)?)).await?;
    Ok(Json(stats))
}
