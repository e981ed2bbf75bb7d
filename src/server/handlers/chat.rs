use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::chat::PromptMode;
use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub email: String,
    pub query: String,
    /// Optional patient context. When present, prior turns for this
    /// (doctor, patient) pair are injected and the new turns are logged.
    pub patient: Option<String>,
    #[serde(default)]
    pub mode: PromptMode,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    let query = payload.query.trim();

    if query.is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }

    // Quota is consumed up front: a failed pipeline still counts as one
    // query, matching the unconditional counter update on the chat path.
    let receipt = state.gate.consume(email).await?;

    let patient = payload
        .patient
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let history: Vec<ChatMessage> = match patient {
        Some(patient_id) => state
            .chatlog
            .history(
                email,
                patient_id,
                state.config.chat.max_history_messages as i64,
            )
            .await?
            .into_iter()
            .map(|entry| ChatMessage {
                role: if entry.is_user { "user" } else { "assistant" }.to_string(),
                content: entry.message,
            })
            .collect(),
        None => Vec::new(),
    };

    let response = state.engine.answer(query, &history, payload.mode).await;

    if let Some(patient_id) = patient {
        state.chatlog.add_patient(email, patient_id).await?;
        state
            .chatlog
            .append_message(email, patient_id, query, true)
            .await?;
        state
            .chatlog
            .append_message(email, patient_id, &response, false)
            .await?;
    }

    Ok(Json(json!({
        "response": response,
        "remaining": receipt.remaining()
    })))
}
