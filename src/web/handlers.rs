use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde_json::json;
use uuid::Uuid;

use crate::chat::{Orchestrator, TurnError};
use crate::web::models::{ChatRequest, ChatResponse, ResetRequest, ResetResponse};

/// User id applied when the request body does not carry one.
pub const DEFAULT_USER_ID: &str = "default";

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// Chat API endpoint
pub async fn chat(
    orchestrator: web::Data<Orchestrator>,
    req: web::Json<ChatRequest>,
) -> impl Responder {
    let request_id = Uuid::new_v4();
    let user_id = req.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    let message = req.message.as_deref().unwrap_or("");

    info!("Chat request {} from user {}", request_id, user_id);

    match orchestrator.handle_turn(user_id, message).await {
        Ok(response) => HttpResponse::Ok().json(ChatResponse { response }),
        Err(TurnError::InvalidInput) => {
            HttpResponse::BadRequest().json(json!({ "error": "No input provided" }))
        }
        Err(err @ TurnError::ReservedInput) => {
            HttpResponse::BadRequest().json(json!({ "error": err.to_string() }))
        }
        Err(err @ TurnError::Generation(_)) => {
            error!("Chat request {} failed: {}", request_id, err);
            HttpResponse::InternalServerError().json(json!({ "error": err.to_string() }))
        }
        Err(TurnError::Internal(err)) => {
            error!("Chat request {} failed: {:#}", request_id, err);
            HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
        }
    }
}

// Reset API endpoint
pub async fn reset(
    orchestrator: web::Data<Orchestrator>,
    req: web::Json<ResetRequest>,
) -> impl Responder {
    let user_id = req.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    info!("Reset request for user {}", user_id);

    match orchestrator.reset(user_id).await {
        Ok(()) => HttpResponse::Ok().json(ResetResponse {
            message: "Conversation history cleared".to_string(),
        }),
        Err(err) => {
            error!("Reset for user {} failed: {}", user_id, err);
            HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::test_support::{EchoBackend, FailingBackend};
    use crate::history::HistoryStore;
    use crate::web::routes;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    use crate::model::GenerationBackend;

    fn app_state(dir: &Path, backend: Arc<dyn GenerationBackend>) -> web::Data<Orchestrator> {
        let store = HistoryStore::new(dir).unwrap();
        web::Data::new(Orchestrator::new(store, backend))
    }

    #[actix_web::test]
    async fn chat_replies_and_records_history() {
        let dir = tempdir().unwrap();
        let state = app_state(dir.path(), Arc::new(EchoBackend::new("hi")));
        let app = test::init_service(
            App::new().app_data(state).configure(routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({ "user_id": "u1", "message": "hello" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["response"], "hi");

        let store = HistoryStore::new(dir.path()).unwrap();
        assert_eq!(store.load("u1").len(), 2);
    }

    #[actix_web::test]
    async fn chat_rejects_missing_message() {
        let dir = tempdir().unwrap();
        let state = app_state(dir.path(), Arc::new(EchoBackend::new("hi")));
        let app = test::init_service(
            App::new().app_data(state).configure(routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({ "user_id": "u1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No input provided");
    }

    #[actix_web::test]
    async fn chat_reports_backend_failure_as_server_error() {
        let dir = tempdir().unwrap();
        let state = app_state(dir.path(), Arc::new(FailingBackend));
        let app = test::init_service(
            App::new().app_data(state).configure(routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({ "message": "hello" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("Failed to generate"));
    }

    #[actix_web::test]
    async fn reset_confirms_even_for_unknown_user() {
        let dir = tempdir().unwrap();
        let state = app_state(dir.path(), Arc::new(EchoBackend::new("hi")));
        let app = test::init_service(
            App::new().app_data(state).configure(routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/reset")
            .set_json(json!({ "user_id": "ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Conversation history cleared");
    }
}
