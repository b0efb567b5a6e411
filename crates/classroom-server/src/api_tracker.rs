//! Routes of the student project tracker. No accounts.

use crate::api::{with_conn, ApiError};
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use classroom_tracker::{
    Class, ClassDetail, ClassSummary, CreatedProject, Dashboard, NewClass, NewProject, NewStudent,
    ProjectDetail, ProjectSummary, ReportRow, Student, Submission, SubmissionUpdate,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/classes", get(list_classes_handler).post(create_class_handler))
        .route("/classes/{id}", get(view_class_handler))
        .route(
            "/students",
            get(list_students_handler).post(create_student_handler),
        )
        .route(
            "/projects",
            get(list_projects_handler).post(create_project_handler),
        )
        .route("/projects/{id}", get(view_project_handler))
        .route("/api/update_submission", post(update_submission_handler))
        .route("/report", get(report_handler))
}

pub async fn dashboard_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Dashboard>, ApiError> {
    let dashboard = with_conn(&state, |conn| Ok(classroom_tracker::dashboard(conn)?)).await?;
    Ok(Json(dashboard))
}

pub async fn list_classes_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<ClassSummary>>, ApiError> {
    let classes = with_conn(&state, |conn| Ok(classroom_tracker::list_classes(conn)?)).await?;
    Ok(Json(classes))
}

pub async fn create_class_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(input): Json<NewClass>,
) -> Result<(StatusCode, Json<Class>), ApiError> {
    let class =
        with_conn(&state, move |conn| Ok(classroom_tracker::create_class(conn, &input)?)).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

pub async fn view_class_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ClassDetail>, ApiError> {
    let detail = with_conn(&state, move |conn| Ok(classroom_tracker::view_class(conn, id)?)).await?;
    Ok(Json(detail))
}

pub async fn list_students_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let students = with_conn(&state, |conn| Ok(classroom_tracker::list_students(conn)?)).await?;
    Ok(Json(students))
}

pub async fn create_student_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(input): Json<NewStudent>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    let student = with_conn(&state, move |conn| {
        Ok(classroom_tracker::create_student(conn, &input)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn list_projects_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<ProjectSummary>>, ApiError> {
    let projects = with_conn(&state, |conn| Ok(classroom_tracker::list_projects(conn)?)).await?;
    Ok(Json(projects))
}

/// Handler for `POST /projects`. Checkpoints are planned from today's
/// local date up to the due date.
pub async fn create_project_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(input): Json<NewProject>,
) -> Result<(StatusCode, Json<CreatedProject>), ApiError> {
    let today = chrono::Local::now().date_naive();
    let created = with_conn(&state, move |conn| {
        Ok(classroom_tracker::create_project(conn, &input, today)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn view_project_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProjectDetail>, ApiError> {
    let detail =
        with_conn(&state, move |conn| Ok(classroom_tracker::view_project(conn, id)?)).await?;
    Ok(Json(detail))
}

pub async fn update_submission_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(update): Json<SubmissionUpdate>,
) -> Result<Json<Value>, ApiError> {
    let submission: Submission = with_conn(&state, move |conn| {
        Ok(classroom_tracker::update_submission(conn, &update)?)
    })
    .await?;
    Ok(Json(json!({ "success": true, "submission": submission })))
}

/// Handler for `GET /report`: one row per project, student and checkpoint.
pub async fn report_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<ReportRow>>, ApiError> {
    let rows = with_conn(&state, |conn| Ok(classroom_tracker::report_rows(conn)?)).await?;
    Ok(Json(rows))
}
