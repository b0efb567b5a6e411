mod common;

use axum::http::StatusCode;
use chrono::{Days, Local};
use classroom_types::AppKind;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn project_gets_checkpoints_and_tracks_submissions() {
    let app = TestApp::new(AppKind::Tracker);

    let (status, class) = app
        .post(
            "/classes",
            None,
            json!({ "name": "Period 3", "subject": "Biology", "academic_year": "2024-2025" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, student) = app
        .post(
            "/students",
            None,
            json!({ "first_name": "Ada", "last_name": "Lovelace", "email": "ada@example.com", "class_id": class["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(student["class_name"], "Period 3");

    let today = Local::now().date_naive();
    let due = today.checked_add_days(Days::new(10)).unwrap();
    let (status, created) = app
        .post(
            "/projects",
            None,
            json!({
                "title": "Cell model",
                "class_id": class["id"],
                "due_date": due.format("%Y-%m-%d").to_string(),
                "total_points": 100,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");

    let checkpoints = created["checkpoints"].as_array().unwrap();
    assert_eq!(checkpoints.len(), 3);
    let dates: Vec<&str> = checkpoints
        .iter()
        .map(|c| c["due_date"].as_str().unwrap())
        .collect();
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(dates[2], due.format("%Y-%m-%d").to_string());
    let points: i64 = checkpoints.iter().map(|c| c["points"].as_i64().unwrap()).sum();
    assert!(points <= 100);
    assert_eq!(points + created["lost_points"].as_i64().unwrap(), 100);

    let checkpoint_id = checkpoints[0]["id"].clone();
    let (status, body) = app
        .post(
            "/api/update_submission",
            None,
            json!({ "student_id": student["id"], "checkpoint_id": checkpoint_id, "status": "in_progress" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // A second update overwrites the first.
    let (_, body) = app
        .post(
            "/api/update_submission",
            None,
            json!({
                "student_id": student["id"],
                "checkpoint_id": checkpoint_id,
                "status": "completed",
                "points_earned": 30,
                "feedback": "Nice diagram",
            }),
        )
        .await;
    assert_eq!(body["submission"]["status"], "completed");
    assert_eq!(body["submission"]["project_id"], created["project"]["id"]);
    assert_eq!(app.count("submissions"), 1);

    let (_, detail) = app
        .get(&format!("/projects/{}", created["project"]["id"]), None)
        .await;
    assert_eq!(detail["students"][0]["completed_checkpoints"], 1);

    let (status, report) = app.get("/report", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = report.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["status"], "completed");
    assert_eq!(rows[0]["points_earned"], 30);
    assert_eq!(rows[1]["status"], "Not Started");
    assert_eq!(rows[1]["submitted_at"], "Not Submitted");
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let app = TestApp::new(AppKind::Tracker);

    let (status, _) = app
        .post(
            "/classes",
            None,
            json!({ "name": "", "subject": "Art", "academic_year": "2024" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/projects",
            None,
            json!({ "title": "Orphan", "class_id": 99, "due_date": "2030-01-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, class) = app
        .post(
            "/classes",
            None,
            json!({ "name": "Art 1", "subject": "Art", "academic_year": "2024" }),
        )
        .await;
    let (status, _) = app
        .post(
            "/projects",
            None,
            json!({ "title": "Collage", "class_id": class["id"], "due_date": "next week" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/update_submission",
            None,
            json!({ "student_id": 1, "checkpoint_id": 42, "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, dashboard) = app.get("/", None).await;
    assert_eq!(dashboard["class_count"], 1);
    assert_eq!(dashboard["project_count"], 0);
}
