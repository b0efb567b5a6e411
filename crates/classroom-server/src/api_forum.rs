//! Routes of the threaded discussion board.
//!
//! Reading is open; posting, voting, liking and attaching need a login;
//! moderation is admin only.

use crate::api::{with_conn, ApiError};
use crate::middleware::CurrentUser;
use crate::uploads::{self, UploadRules};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Extension, Json, Multipart, Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use classroom_forum::{
    AdminStats, Attachment, Category, LikeOutcome, NewAttachment, NewThread, PostView, Target,
    Thread, ThreadDetail, ThreadFilters, ThreadList, ThreadSort, VoteOutcome,
    ATTACHMENT_EXTENSIONS,
};
use classroom_types::{Role, VoteKind};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category_id: Option<i64>,
    pub search: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_post_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: VoteKind,
}

pub fn routes(max_upload_bytes: usize) -> Router {
    let upload_routes = Router::new()
        .route("/threads/{id}/attachments", post(thread_attachments_handler))
        .route("/posts/{id}/attachments", post(post_attachments_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .route("/", get(list_handler))
        .route("/threads", get(list_handler).post(create_handler))
        .route("/threads/{id}", get(view_handler))
        .route("/threads/{id}/replies", post(reply_handler))
        .route("/vote/{target}/{id}", post(vote_handler))
        .route("/like/{target}/{id}", post(like_handler))
        .route("/categories", get(categories_handler))
        .route("/admin", get(admin_handler))
        .route("/admin/threads", get(admin_threads_handler))
        .route("/admin/threads/{id}/pin", post(pin_handler))
        .route("/admin/threads/{id}/lock", post(lock_handler))
        .route("/admin/threads/{id}", delete(delete_handler))
        .merge(upload_routes)
}

pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ThreadList>, ApiError> {
    let sort = ThreadSort::from_param(params.sort.as_deref());
    let filters = ThreadFilters {
        category_id: params.category_id,
        search: params.search,
    };
    let list = with_conn(&state, move |conn| {
        Ok(classroom_forum::list_threads(conn, &filters, sort)?)
    })
    .await?;
    Ok(Json(list))
}

pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<NewThread>,
) -> Result<(StatusCode, Json<Thread>), ApiError> {
    let author = current.require()?.clone();
    let thread = with_conn(&state, move |conn| {
        Ok(classroom_forum::create_thread(conn, &author, &payload)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

pub async fn view_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ThreadDetail>, ApiError> {
    let detail = with_conn(&state, move |conn| Ok(classroom_forum::view_thread(conn, id)?)).await?;
    Ok(Json(detail))
}

pub async fn reply_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ReplyRequest>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    let author = current.require()?.clone();
    let post = with_conn(&state, move |conn| {
        Ok(classroom_forum::reply(
            conn,
            &author,
            id,
            &payload.content,
            payload.parent_post_id,
        )?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn vote_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path((target, id)): Path<(String, i64)>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteOutcome>, ApiError> {
    let user = current.require()?.clone();
    let target: Target = target.parse()?;
    let outcome = with_conn(&state, move |conn| {
        Ok(classroom_forum::vote(conn, &user, target, id, payload.vote_type)?)
    })
    .await?;
    Ok(Json(outcome))
}

pub async fn like_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path((target, id)): Path<(String, i64)>,
) -> Result<Json<LikeOutcome>, ApiError> {
    let user = current.require()?.clone();
    let target: Target = target.parse()?;
    let outcome = with_conn(&state, move |conn| {
        Ok(classroom_forum::toggle_like(conn, &user, target, id)?)
    })
    .await?;
    Ok(Json(outcome))
}

pub async fn thread_attachments_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<Attachment>>), ApiError> {
    attach(state, current, Target::Thread, id, multipart).await
}

pub async fn post_attachments_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<Attachment>>), ApiError> {
    attach(state, current, Target::Post, id, multipart).await
}

/// Stores every file of the multipart body and records it against the
/// target. A file whose record cannot be written is removed again.
async fn attach(
    state: Arc<AppState>,
    current: CurrentUser,
    target: Target,
    id: i64,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<Attachment>>), ApiError> {
    let user = current.require()?.clone();
    let rules = UploadRules {
        allowed_extensions: ATTACHMENT_EXTENSIONS,
        max_bytes: state.max_upload_bytes,
    };

    let mut attachments = Vec::new();
    while let Some(saved) = uploads::next_upload(&mut multipart, &state.upload_dir, rules).await? {
        let file = NewAttachment {
            filename: saved.stored_name.clone(),
            original_filename: saved.original_filename.clone(),
            file_path: saved.path.to_string_lossy().into_owned(),
            file_size: saved.size as i64,
            mime_type: saved.content_type.clone(),
        };
        let user = user.clone();
        let recorded = with_conn(&state, move |conn| {
            Ok(classroom_forum::add_attachment(conn, &user, target, id, &file)?)
        })
        .await;
        match recorded {
            Ok(attachment) => attachments.push(attachment),
            Err(e) => {
                saved.discard().await;
                return Err(e);
            }
        }
    }

    if attachments.is_empty() {
        return Err(ApiError::BadRequest("no file provided".to_string()));
    }
    Ok((StatusCode::CREATED, Json(attachments)))
}

pub async fn categories_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = with_conn(&state, |conn| Ok(classroom_forum::list_categories(conn)?)).await?;
    Ok(Json(categories))
}

pub async fn admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<AdminStats>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let stats = with_conn(&state, |conn| Ok(classroom_forum::admin_stats(conn)?)).await?;
    Ok(Json(stats))
}

pub async fn admin_threads_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Thread>>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let threads = with_conn(&state, |conn| Ok(classroom_forum::admin_threads(conn)?)).await?;
    Ok(Json(threads))
}

pub async fn pin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let pinned = with_conn(&state, move |conn| Ok(classroom_forum::toggle_pin(conn, id)?)).await?;
    Ok(Json(json!({ "success": true, "is_pinned": pinned })))
}

pub async fn lock_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let locked = with_conn(&state, move |conn| Ok(classroom_forum::toggle_lock(conn, id)?)).await?;
    Ok(Json(json!({ "success": true, "is_locked": locked })))
}

/// Handler for `DELETE /admin/threads/{id}`. Attachment files are removed
/// after the rows are gone; a file that cannot be removed is only logged.
pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let paths =
        with_conn(&state, move |conn| Ok(classroom_forum::delete_thread(conn, id)?)).await?;
    for path in &paths {
        uploads::remove_file(std::path::Path::new(path)).await;
    }
    Ok(Json(json!({ "success": true, "attachments_removed": paths.len() })))
}
