//! HTTP surface.
//!
//! - POST /ask            - answer a question from a JSON body
//! - GET  /quick?q=...    - same, from a query parameter
//! - GET  /health         - database and model probes
//! - GET  /top-students   - students ordered by net fee, bypasses the model
//! - GET  /student/:name  - one student by name, bypasses the model

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::database::{Row, StudentDirectory};
use crate::text_to_sql_chain::{AnswerRecord, AnswerSource, TextToSqlChain};

const DEFAULT_TOP_STUDENTS: i64 = 5;
const MAX_TOP_STUDENTS: i64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<TextToSqlChain>,
    pub students: Arc<dyn StudentDirectory>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuickParams {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopStudentsParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub success: bool,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: AnswerSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Row>>,
}

impl From<AnswerRecord> for AskResponse {
    fn from(record: AnswerRecord) -> Self {
        Self {
            success: record.success,
            question: record.question,
            answer: record.answer,
            error: record.error,
            source: record.source,
            sql_used: record.sql_query,
            result: record.success.then_some(record.result),
        }
    }
}

fn answer_response(record: AnswerRecord) -> Response {
    let status = match record.source {
        AnswerSource::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
        AnswerSource::ProcessingError => StatusCode::INTERNAL_SERVER_ERROR,
        AnswerSource::DirectSql | AnswerSource::AiAgent => StatusCode::OK,
    };
    (status, Json(AskResponse::from(record))).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ask", post(ask))
        .route("/quick", get(quick))
        .route("/health", get(health))
        .route("/top-students", get(top_students))
        .route("/student/:name", get(student))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to Training Institute Chatbot API" }))
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            info!(error = %rejection, "malformed ask request");
            let body = AskResponse {
                success: false,
                question: String::new(),
                answer: None,
                error: Some("Request body must be JSON with a \"question\" field.".to_string()),
                source: AnswerSource::ValidationError,
                sql_used: None,
                result: None,
            };
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
        }
    };

    let record = state
        .chain
        .ask_question(&request.question, request.context.as_deref())
        .await;
    answer_response(record)
}

async fn quick(State(state): State<AppState>, Query(params): Query<QuickParams>) -> Response {
    let question = params.q.unwrap_or_default();
    answer_response(state.chain.ask_question(&question, None).await)
}

async fn health(State(state): State<AppState>) -> Response {
    let report = state.chain.health_check().await;
    let status = if report.agent {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

async fn top_students(
    State(state): State<AppState>,
    Query(params): Query<TopStudentsParams>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TOP_STUDENTS)
        .clamp(1, MAX_TOP_STUDENTS);

    match state.students.top_students(limit).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!(error = %e, "top students lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Could not load students" })),
            )
                .into_response()
        }
    }
}

async fn student(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.students.find_student(&name).await {
        Ok(Some(row)) => Json(row).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Student not found" })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "student lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Could not load student" })),
            )
                .into_response()
        }
    }
}
