use serde::{Deserialize, Serialize};

/// Body of `POST /chat`. Both fields optional: a missing `user_id`
/// falls back to the default user, a missing `message` is rejected by
/// the orchestrator as empty input.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Body of `POST /reset`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub message: String,
}
