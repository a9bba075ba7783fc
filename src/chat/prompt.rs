//! Prompt assembly: renders accumulated history plus the incoming user
//! message into the exact input form a given backend expects.

use serde::Serialize;
use thiserror::Error;

use crate::chat::message::{Message, Role};

/// Which generation provider a turn targets. Determines the role
/// vocabulary and the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Local model server speaking the Gemma chat template (flat text).
    Gemma,
    /// OpenAI-compatible chat completions API (structured messages).
    OpenAi,
}

/// Gemma turn markers. Message content must never carry these raw, or
/// role boundaries in the rendered prompt become ambiguous.
pub const START_OF_TURN: &str = "<start_of_turn>";
pub const END_OF_TURN: &str = "<end_of_turn>";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("message content contains reserved token {token:?}")]
    ReservedToken { token: &'static str },
}

/// One message as a backend sees it, role label already translated.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

/// Assembled input for a single generation call.
#[derive(Debug, Clone)]
pub enum PromptPayload {
    /// Flat templated string ending in a generation cue.
    Text(String),
    /// Ordered role/content records, passed through as-is.
    Messages(Vec<WireMessage>),
}

/// Translate an internal role into the label `kind` expects.
///
/// Total over both enumerations. Supporting a new backend means adding
/// its arms here, not rewriting role strings at call sites.
pub fn role_label(role: Role, kind: BackendKind) -> &'static str {
    match (role, kind) {
        (Role::User, _) => "user",
        (Role::Agent, BackendKind::Gemma) => "model",
        (Role::Agent, BackendKind::OpenAi) => "assistant",
    }
}

pub fn contains_reserved_token(text: &str) -> bool {
    text.contains(START_OF_TURN) || text.contains(END_OF_TURN)
}

/// Build the payload for `history ++ [new_user_message]`.
///
/// `history` is not mutated; committing the extended list to storage is
/// the orchestrator's decision, taken only after generation succeeds.
/// The full history is included every turn; nothing is truncated here.
pub fn assemble(
    history: &[Message],
    new_user_message: &Message,
    kind: BackendKind,
) -> Result<PromptPayload, PromptError> {
    let ordered = history.iter().chain(std::iter::once(new_user_message));

    match kind {
        BackendKind::Gemma => {
            let mut prompt = String::new();
            for message in ordered {
                check_reserved(&message.content)?;
                prompt.push_str(START_OF_TURN);
                prompt.push_str(role_label(message.role, kind));
                prompt.push('\n');
                prompt.push_str(&message.content);
                prompt.push_str(END_OF_TURN);
                prompt.push('\n');
            }
            // Trailing cue: the model speaks next.
            prompt.push_str(START_OF_TURN);
            prompt.push_str(role_label(Role::Agent, kind));
            prompt.push('\n');
            Ok(PromptPayload::Text(prompt))
        }
        BackendKind::OpenAi => {
            let messages = ordered
                .map(|message| WireMessage {
                    role: role_label(message.role, kind),
                    content: message.content.clone(),
                })
                .collect();
            Ok(PromptPayload::Messages(messages))
        }
    }
}

fn check_reserved(content: &str) -> Result<(), PromptError> {
    for token in [START_OF_TURN, END_OF_TURN] {
        if content.contains(token) {
            return Err(PromptError::ReservedToken { token });
        }
    }
    Ok(())
}
