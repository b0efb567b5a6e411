mod common;

use axum::http::{Method, StatusCode};
use classroom_types::AppKind;
use common::{multipart_file, TestApp};
use serde_json::json;

#[tokio::test]
async fn post_lifecycle_with_comments_and_image() {
    let app = TestApp::new(AppKind::Blog);
    let author = app.register_and_login("writer").await;
    let reader = app.register_and_login("reader").await;

    let (status, post) = app
        .post(
            "/posts",
            Some(&author),
            json!({
                "title": "Field Trip: Science Museum!",
                "content": "We saw a planetarium show.",
                "publish": true,
                "tags": "science, trips, science",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["slug"], "field-trip-science-museum");
    assert_eq!(post["status"], "published");
    let uri = "/posts/field-trip-science-museum";

    let (status, comment) = app
        .post(
            &format!("{uri}/comments"),
            Some(&reader),
            json!({ "content": "Looks fun" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post(
            &format!("{uri}/comments"),
            Some(&author),
            json!({ "content": "It was!", "parent_id": comment["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, detail) = app.get(uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["post"]["view_count"], 1);
    assert_eq!(detail["tags"].as_array().unwrap().len(), 2);
    assert_eq!(detail["comments"][0]["content"], "Looks fun");
    assert_eq!(detail["comments"][0]["replies"][0]["content"], "It was!");

    // Only the author may change the image.
    let request = multipart_file(&format!("{uri}/image"), &reader, "image", "cover.png", b"png");
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = multipart_file(&format!("{uri}/image"), &author, "image", "cover.png", b"png");
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let stored = body["post"]["featured_image"].as_str().unwrap().to_string();
    assert!(stored.ends_with("_cover.png"));
    assert_eq!(body["url"], format!("/uploads/{stored}"));
    assert!(app.upload_dir.join(&stored).exists());

    let (status, _) = app.call(Method::DELETE, uri, Some(&reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, uri, Some(&author), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.upload_dir.join(&stored).exists());

    let (status, _) = app.get(uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn image_upload_rejects_other_extensions() {
    let app = TestApp::new(AppKind::Blog);
    let author = app.register_and_login("ivy").await;
    app.post(
        "/posts",
        Some(&author),
        json!({ "title": "Notes", "content": "Body", "publish": true }),
    )
    .await;

    let request = multipart_file("/posts/notes/image", &author, "image", "script.sh", b"echo");
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!app.upload_dir.exists() || std::fs::read_dir(&app.upload_dir).unwrap().next().is_none());
}

#[tokio::test]
async fn drafts_are_private_to_their_author() {
    let app = TestApp::new(AppKind::Blog);
    let author = app.register_and_login("dana").await;
    let other = app.register_and_login("eli").await;

    let (_, draft) = app
        .post(
            "/posts",
            Some(&author),
            json!({ "title": "Work in progress", "content": "TBD" }),
        )
        .await;
    assert_eq!(draft["status"], "draft");

    let slugs = |body: &serde_json::Value| -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|p| p["slug"].as_str().unwrap().to_string())
            .collect()
    };
    let (_, mine) = app.get("/posts", Some(&author)).await;
    assert!(slugs(&mine).contains(&"work-in-progress".to_string()));
    let (_, theirs) = app.get("/posts", Some(&other)).await;
    assert!(!slugs(&theirs).contains(&"work-in-progress".to_string()));
    let (_, anonymous) = app.get("/posts", None).await;
    assert!(!slugs(&anonymous).contains(&"work-in-progress".to_string()));

    let (status, _) = app.get("/posts/work-in-progress", Some(&other)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .post(
            "/posts/work-in-progress/comments",
            Some(&other),
            json!({ "content": "first!" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.count("comments"), 0);
}

#[tokio::test]
async fn repeated_titles_get_numbered_slugs() {
    let app = TestApp::new(AppKind::Blog);
    let author = app.register_and_login("finn").await;
    let mut slugs = Vec::new();
    for _ in 0..3 {
        let (_, post) = app
            .post(
                "/posts",
                Some(&author),
                json!({ "title": "Weekly Update", "content": "News", "publish": true }),
            )
            .await;
        slugs.push(post["slug"].as_str().unwrap().to_string());
    }
    assert_eq!(slugs, vec!["weekly-update", "weekly-update-2", "weekly-update-3"]);

    let (status, _) = app.post("/posts", None, json!({ "title": "x", "content": "y" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
