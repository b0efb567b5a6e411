mod common;

use axum::http::{Method, StatusCode};
use classroom_types::AppKind;
use common::TestApp;
use serde_json::{json, Value};

fn titles(list: &Value) -> Vec<&str> {
    list["todos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect()
}

async fn seed(app: &TestApp) {
    for todo in [
        json!({ "title": "Grade essays", "category": "School", "tags": "grading, english", "due_date": "2024-05-03", "priority": "Low" }),
        json!({ "title": "Buy chalk", "tags": "supplies", "priority": "High" }),
        json!({ "title": "Plan field trip", "category": "School", "tags": " trips ,, planning ", "due_date": "2024-04-20" }),
    ] {
        let (status, _) = app.post("/todos", None, todo).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn list_sorts_and_filters() {
    let app = TestApp::new(AppKind::Todo);
    seed(&app).await;

    let (status, list) = app.get("/todos", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["sort"], "due_date");
    assert_eq!(titles(&list), vec!["Plan field trip", "Grade essays", "Buy chalk"]);
    assert_eq!(list["categories"], json!(["General", "School"]));
    assert_eq!(
        list["tags"],
        json!(["english", "grading", "planning", "supplies", "trips"])
    );

    let (_, list) = app.get("/todos?sort=priority", None).await;
    assert_eq!(titles(&list), vec!["Buy chalk", "Plan field trip", "Grade essays"]);

    let (_, list) = app.get("/todos?sort=bogus", None).await;
    assert_eq!(list["sort"], "due_date");

    let (_, list) = app.get("/todos?category=School&tag=trips", None).await;
    assert_eq!(titles(&list), vec!["Plan field trip"]);

    // "trip" must not match the "trips" tag.
    let (_, list) = app.get("/todos?tag=trip", None).await;
    assert!(titles(&list).is_empty());

    let (_, list) = app.get("/todos?priority=High&category=", None).await;
    assert_eq!(titles(&list), vec!["Buy chalk"]);

    let (status, _) = app.get("/todos?priority=urgent", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn toggle_update_and_delete() {
    let app = TestApp::new(AppKind::Todo);
    let (_, todo) = app
        .post("/todos", None, json!({ "title": "Call parents" }))
        .await;
    assert_eq!(todo["category"], "General");
    assert_eq!(todo["priority"], "Medium");
    assert_eq!(todo["completed"], false);
    let uri = format!("/todos/{}", todo["id"]);

    let (_, toggled) = app.post(&format!("{uri}/toggle"), None, json!({})).await;
    assert_eq!(toggled["completed"], true);
    let (_, toggled) = app.post(&format!("{uri}/toggle"), None, json!({})).await;
    assert_eq!(toggled["completed"], false);

    let (status, updated) = app
        .call(
            Method::PUT,
            &uri,
            None,
            Some(json!({ "title": "Call parents", "due_date": "2024-02-30" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{updated}");

    let (status, updated) = app
        .call(
            Method::PUT,
            &uri,
            None,
            Some(json!({ "title": "Call parents", "due_date": "2024-02-29", "priority": "High" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["due_date"], "2024-02-29");

    let (status, _) = app.call(Method::DELETE, &uri, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.post(&format!("{uri}/toggle"), None, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let app = TestApp::new(AppKind::Todo);
    let (status, body) = app.post("/todos", None, json!({ "title": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title is required!");
    assert_eq!(app.count("todos"), 0);
}
