//! Conversation orchestration.
//!
//! One call, one atomic turn: load the user's history, assemble the
//! prompt, run generation, and only then commit the user/agent message
//! pair back to storage. A failed generation never leaves a dangling
//! user message behind.

pub mod message;
pub mod prompt;

use std::collections::HashMap;
use std::sync::Arc;

use log::error;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::history::HistoryStore;
use crate::model::GenerationBackend;
use message::Message;
use prompt::assemble;

#[derive(Debug, Error)]
pub enum TurnError {
    /// Empty or missing user text, rejected before any state is touched.
    #[error("No input provided")]
    InvalidInput,

    /// User text carrying a raw turn-marker token.
    #[error("Message contains a reserved control token")]
    ReservedInput,

    /// The backend raised, timed out, or produced unusable output.
    /// History is untouched when this is returned.
    #[error("Failed to generate response: {0}")]
    Generation(anyhow::Error),

    #[error("Internal server error")]
    Internal(anyhow::Error),
}

pub struct Orchestrator {
    store: HistoryStore,
    backend: Arc<dyn GenerationBackend>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(store: HistoryStore, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            store,
            backend,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock handle for `user_id`. Turns for the same user serialize on
    /// it; turns for different users never share a lock.
    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Run one conversational turn for `user_id` and return the reply.
    ///
    /// On success the stored history gains exactly the user/agent pair
    /// for this turn. On any failure before persistence the store is
    /// left exactly as it was. A failed save after a successful
    /// generation is logged but does not fail the turn: the caller
    /// already has the response.
    pub async fn handle_turn(&self, user_id: &str, user_text: &str) -> Result<String, TurnError> {
        if user_text.trim().is_empty() {
            return Err(TurnError::InvalidInput);
        }
        if prompt::contains_reserved_token(user_text) {
            return Err(TurnError::ReservedInput);
        }

        let lock = self.user_lock(user_id).await;
        let _turn = lock.lock().await;

        let history = self.store.load(user_id);
        let user_message = Message::user(user_text);

        // User text was screened above, so a reserved token here means
        // a hand-edited history file.
        let payload = assemble(&history, &user_message, self.backend.kind())
            .map_err(|e| TurnError::Internal(anyhow::Error::new(e)))?;

        let response = self
            .backend
            .generate(payload)
            .await
            .map_err(TurnError::Generation)?;
        let response = response.trim().to_string();
        if response.is_empty() {
            return Err(TurnError::Generation(anyhow::anyhow!(
                "backend returned empty output"
            )));
        }

        let mut updated = history;
        updated.push(user_message);
        updated.push(Message::agent(response.clone()));

        if let Err(e) = self.store.save(user_id, &updated) {
            error!("Failed to persist history for {}: {}", user_id, e);
        }

        Ok(response)
    }

    /// Drop all stored history for `user_id`. Resetting an unknown
    /// user is a no-op.
    pub async fn reset(&self, user_id: &str) -> Result<(), TurnError> {
        let lock = self.user_lock(user_id).await;
        let _turn = lock.lock().await;

        self.store
            .delete(user_id)
            .map_err(|e| TurnError::Internal(anyhow::Error::new(e)))
    }
}
