use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::rag::{QueryResult, RagEngine};

const INDEX_PAGE: &str = "static/index.html";

pub struct AppState {
    pub engine: RagEngine,
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/ask", post(ask))
        .nest_service("/static", ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the front-end page when present, a liveness message otherwise.
async fn home() -> Response {
    match tokio::fs::read_to_string(INDEX_PAGE).await {
        Ok(page) => Html(page).into_response(),
        Err(_) => Json(json!({ "message": "RAG Q&A API is running!" })).into_response(),
    }
}

#[derive(Deserialize)]
struct AskRequest {
    question: Option<String>,
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<QueryResult>, (StatusCode, Json<serde_json::Value>)> {
    let question = request
        .question
        .as_deref()
        .map(str::trim)
        .filter(|question| !question.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing 'question' in request body" })),
            )
        })?;

    info!("Processing question: {}", question);

    match state.engine.ask(question).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            error!("Error answering question: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}

/// Bind and serve until shutdown.
pub async fn serve(engine: RagEngine, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(AppState { engine });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, Embedding, EmbeddingError};
    use crate::index::{IndexError, IndexedDocument, RetrievedChunk, VectorIndex};
    use crate::llm::{ChatModel, LlmError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct StaticEmbedder;

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            Ok(Embedding {
                values: vec![0.5, 0.5],
            })
        }
    }

    struct StaticIndex;

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn upload(&self, _document: IndexedDocument) -> Result<(), IndexError> {
            Ok(())
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            _limit: u64,
        ) -> Result<Vec<RetrievedChunk>, IndexError> {
            Ok(vec![RetrievedChunk {
                id: "11111111-1111-1111-1111-111111111111".to_string(),
                content: "Indexed passage.".to_string(),
                score: 0.95,
            }])
        }
    }

    struct StaticChat;

    #[async_trait]
    impl ChatModel for StaticChat {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok("A grounded answer.".to_string())
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatModel for FailingChat {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::Api {
                status: 503,
                body: "model overloaded".to_string(),
            })
        }
    }

    fn router(chat: Arc<dyn ChatModel>) -> Router {
        let engine = RagEngine::new(Arc::new(StaticEmbedder), Arc::new(StaticIndex), chat);
        build_router(Arc::new(AppState { engine }))
    }

    async fn post_ask(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ask")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap();
        (status, value)
    }

    #[tokio::test]
    async fn home_reports_liveness() {
        let response = router(Arc::new(StaticChat))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["message"], "RAG Q&A API is running!");
    }

    #[tokio::test]
    async fn missing_question_is_a_client_error() {
        let (status, body) = post_ask(router(Arc::new(StaticChat)), "{}").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn blank_question_is_a_client_error() {
        let (status, body) = post_ask(router(Arc::new(StaticChat)), r#"{"question": "  "}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn valid_question_returns_answer_and_sources() {
        let (status, body) = post_ask(
            router(Arc::new(StaticChat)),
            r#"{"question": "What is indexed?"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["question"], "What is indexed?");
        assert_eq!(body["answer"], "A grounded answer.");
        assert_eq!(
            body["sources"],
            json!(["11111111-1111-1111-1111-111111111111"])
        );
    }

    #[tokio::test]
    async fn engine_failure_maps_to_server_error() {
        let (status, body) = post_ask(
            router(Arc::new(FailingChat)),
            r#"{"question": "Anything?"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }
}
