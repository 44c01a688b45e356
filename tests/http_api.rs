mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use institute_sql_chat::api::{router, AppState};

use common::{chain, row, FakeDatabase, FakeStudents, ScriptedModel};

fn app_with(model: ScriptedModel, db: FakeDatabase) -> Router {
    let students = FakeStudents {
        rows: vec![
            row(r#"{"name":"Asha","net_fee":52000}"#),
            row(r#"{"name":"Ravi","net_fee":48000}"#),
        ],
    };
    router(AppState {
        chain: Arc::new(chain(Arc::new(model), Arc::new(db))),
        students: Arc::new(students),
    })
}

fn app() -> Router {
    app_with(
        ScriptedModel::new("SELECT name FROM students"),
        FakeDatabase::new(vec![row(r#"{"name":"Asha"}"#)]),
    )
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn ask_returns_answer_and_sql() {
    let (status, body) = send(
        app(),
        post_json("/ask", r#"{"question":"list student names","context":"all centres"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["source"], "ai_agent");
    assert_eq!(body["answer"], "Scripted answer.");
    assert_eq!(body["sql_used"], "SELECT name FROM students LIMIT 100");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn ask_rejects_short_questions() {
    let (status, body) = send(app(), post_json("/ask", r#"{"question":"hi"}"#)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["source"], "validation_error");
    assert!(body["error"].as_str().unwrap().contains("at least 3"));
}

#[tokio::test]
async fn ask_rejects_malformed_bodies_with_json() {
    let (status, body) = send(app(), post_json("/ask", r#"{"query":"no question"}"#)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["source"], "validation_error");
}

#[tokio::test]
async fn processing_errors_are_generic() {
    let mut db = FakeDatabase::new(vec![]);
    db.fail_with = Some("permission denied for table students".to_string());
    let app = app_with(ScriptedModel::new("SELECT name FROM students"), db);

    let (status, body) = send(app, post_json("/ask", r#"{"question":"list student names"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["source"], "processing_error");
    assert!(!body["error"].as_str().unwrap().contains("permission denied"));
}

#[tokio::test]
async fn quick_uses_the_query_parameter() {
    let counting = app_with(
        ScriptedModel::new("SELECT name FROM students"),
        FakeDatabase::new(vec![row(r#"{"total_centers":4}"#)]),
    );

    let (status, body) = send(counting, get("/quick?q=how%20many%20branches%20are%20there")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "direct_sql");
    assert_eq!(body["result"][0]["total_centers"], 4);

    let (status, _) = send(app(), get("/quick")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_reports_probe_results() {
    let (status, body) = send(app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], true);
    assert_eq!(body["openai"], true);
    assert_eq!(body["agent"], true);

    let mut db = FakeDatabase::new(vec![]);
    db.healthy = false;
    let (status, body) = send(app_with(ScriptedModel::new("SELECT 1"), db), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], false);
    assert_eq!(body["agent"], false);
}

#[tokio::test]
async fn top_students_honours_the_limit() {
    let (status, body) = send(app(), get("/top-students?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "Asha");

    let (_, body) = send(app(), get("/top-students")).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn student_lookup_by_name() {
    let (status, body) = send(app(), get("/student/ravi")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["net_fee"], 48000);

    let (status, body) = send(app(), get("/student/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Student not found");
}

#[tokio::test]
async fn root_says_hello() {
    let (status, body) = send(app(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("Chatbot"));
}
