//! Routes of the blog app.
//!
//! Reading is open to everyone; drafts are only visible to their author.
//! Writing needs a login.

use crate::api::{with_conn, ApiError};
use crate::middleware::CurrentUser;
use crate::uploads::{self, UploadRules};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Extension, Json, Multipart, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use classroom_blog::{
    AdminStats, Comment, Home, NewPost, Post, PostDetail, PostFilters, Profile,
    IMAGE_EXTENSIONS, MAX_IMAGE_BYTES,
};
use classroom_types::Role;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

pub fn routes(max_upload_bytes: usize) -> Router {
    let upload_routes = Router::new()
        .route("/posts/{slug}/image", post(image_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .route("/", get(home_handler))
        .route("/posts", get(list_handler).post(create_handler))
        .route("/posts/{slug}", get(view_handler).delete(delete_handler))
        .route("/posts/{slug}/comments", post(comment_handler))
        .route("/profile", get(profile_handler))
        .route("/admin", get(admin_handler))
        .merge(upload_routes)
}

pub async fn home_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Home>, ApiError> {
    let home = with_conn(&state, |conn| Ok(classroom_blog::home(conn)?)).await?;
    Ok(Json(home))
}

pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(filters): Query<PostFilters>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let viewer = current.0;
    let posts = with_conn(&state, move |conn| {
        Ok(classroom_blog::list_posts(conn, viewer.as_ref(), &filters)?)
    })
    .await?;
    Ok(Json(posts))
}

pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let author = current.require()?.clone();
    let post = with_conn(&state, move |conn| {
        Ok(classroom_blog::create_post(conn, &author, &payload)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn view_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(slug): Path<String>,
) -> Result<Json<PostDetail>, ApiError> {
    let viewer = current.0;
    let detail = with_conn(&state, move |conn| {
        Ok(classroom_blog::view_post(conn, viewer.as_ref(), &slug)?)
    })
    .await?;
    Ok(Json(detail))
}

pub async fn comment_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(slug): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let user = current.require()?.clone();
    let comment = with_conn(&state, move |conn| {
        Ok(classroom_blog::add_comment(
            conn,
            &user,
            &slug,
            &payload.content,
            payload.parent_id,
        )?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = current.require()?.clone();
    let post = with_conn(&state, move |conn| {
        Ok(classroom_blog::delete_post(conn, &user, &slug)?)
    })
    .await?;

    if let Some(path) = post
        .featured_image
        .as_deref()
        .and_then(|name| uploads::stored_path(&state.upload_dir, name))
    {
        uploads::remove_file(&path).await;
    }
    Ok(Json(json!({ "message": "Post deleted successfully!", "slug": post.slug })))
}

/// Handler for `POST /posts/{slug}/image`. Replaces the post's featured
/// image with the first file of the multipart body.
pub async fn image_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(slug): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let user = current.require()?.clone();
    let rules = UploadRules {
        allowed_extensions: IMAGE_EXTENSIONS,
        max_bytes: MAX_IMAGE_BYTES.min(state.max_upload_bytes),
    };
    let saved = uploads::next_upload(&mut multipart, &state.upload_dir, rules)
        .await?
        .ok_or_else(|| ApiError::BadRequest("no file provided".to_string()))?;

    let stored = saved.stored_name.clone();
    let result = with_conn(&state, move |conn| {
        Ok(classroom_blog::set_featured_image(conn, &user, &slug, &stored)?)
    })
    .await;

    let (post, previous) = match result {
        Ok(updated) => updated,
        Err(e) => {
            saved.discard().await;
            return Err(e);
        }
    };
    if let Some(path) = previous
        .as_deref()
        .and_then(|name| uploads::stored_path(&state.upload_dir, name))
    {
        uploads::remove_file(&path).await;
    }

    Ok(Json(json!({ "post": post, "url": saved.url() })))
}

pub async fn profile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Profile>, ApiError> {
    let user = current.require()?.clone();
    let profile = with_conn(&state, move |conn| Ok(classroom_blog::profile(conn, &user)?)).await?;
    Ok(Json(profile))
}

pub async fn admin_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<AdminStats>, ApiError> {
    current.require_role(&[Role::Admin])?;
    let stats = with_conn(&state, |conn| Ok(classroom_blog::admin_stats(conn)?)).await?;
    Ok(Json(stats))
}
