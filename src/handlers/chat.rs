use crate::{chat::OutboundMessage, errors::ServiceError, AppState};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// One inbound conversational update from the transport
///
/// Carries either free text or a callback token; when both are present the
/// callback wins, matching how chat transports deliver button taps.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatUpdate {
    pub user_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub callback: Option<String>,
}

/// The prompts the engine produced for this update
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatReplies {
    pub messages: Vec<OutboundMessage>,
}

/// Feeds one update through the conversation engine
#[utoipa::path(
    post,
    path = "/api/v1/chat/update",
    request_body = ChatUpdate,
    responses(
        (status = 200, description = "Replies to render", body = ChatReplies),
        (status = 400, description = "Update carried neither text nor callback", body = crate::errors::ErrorResponse),
    ),
    tag = "Chat"
)]
pub async fn chat_update(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ChatUpdate>,
) -> Result<Json<ChatReplies>, ServiceError> {
    let messages = match (update.text, update.callback) {
        (_, Some(callback)) => state.engine.handle_callback(update.user_id, &callback).await?,
        (Some(text), None) => state.engine.handle_text(update.user_id, &text).await?,
        (None, None) => {
            return Err(ServiceError::InvalidInput(
                "update carries neither text nor callback".to_string(),
            ));
        }
    };

    Ok(Json(ChatReplies { messages }))
}
