#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use classcal::reference::{ReferenceRow, ReferenceStore};
use classcal::state::AppState;
use classcal::tasks::TaskStore;
use classcal::web::create_router;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "classcal-test-boundary";

/// Router plus the state and scratch directory behind it.
pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

pub fn test_app(capacity: usize) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let reference = ReferenceStore::new();
    reference.replace(vec![ReferenceRow::new(
        "NET.01.101",
        "Lecture Hall",
        "Dept. of Cardiology",
        "1094 Budapest Tömő 25-29",
    )]);
    let state = AppState::new(
        TaskStore::new(capacity, 100),
        reference,
        dir.path().to_path_buf(),
        1024 * 1024,
    );
    let router = create_router(state.clone());
    TestApp { dir, state, router }
}

/// A calendar with one event per location.
pub fn calendar(locations: &[&str]) -> String {
    let mut out = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n");
    for (i, location) in locations.iter().enumerate() {
        out.push_str(&format!(
            "BEGIN:VEVENT\r\nUID:{i}@test\r\nSUMMARY:Lecture {i}\r\nLOCATION:{location}\r\nEND:VEVENT\r\n"
        ));
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}

/// A `multipart/form-data` body with a single file part.
pub fn multipart_body(field: &str, file_name: &str, contents: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    )
}

pub fn upload_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Upload a calendar and return its task id.
pub async fn upload(app: &TestApp, contents: &str) -> String {
    let response = send(
        &app.router,
        upload_request(multipart_body("file", "timetable.ics", contents)),
    )
    .await;
    let (status, body) = json(response).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {body}");
    body["task_id"].as_str().unwrap().to_owned()
}
