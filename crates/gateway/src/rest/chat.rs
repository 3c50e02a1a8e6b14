//! Chat REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Extension, Json, Router,
};
use parlor_auth::AuthenticatedUser;
use parlor_chats::{Chat, Message};
use serde::Deserialize;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub participant_id: String,
}

pub fn create_chat_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/chats", get(list_chats).post(create_chat))
        .route("/chats/:chat_id", delete(delete_chat))
        .route("/chats/:chat_id/messages", get(list_messages))
        .route("/chats/:chat_id/clear", delete(clear_chat))
}

/// Returns the existing chat when the pair already has one.
pub async fn create_chat(
    State(state): State<Arc<GatewayState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateChatRequest>,
) -> GatewayResult<Json<Chat>> {
    let participant = request.participant_id.trim();
    if participant.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "participantId must not be empty".to_string(),
        ));
    }

    let chat = state.store().create_chat(&user.user_id, participant).await?;
    Ok(Json(chat))
}

pub async fn list_chats(
    State(state): State<Arc<GatewayState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> GatewayResult<Json<Vec<Chat>>> {
    let chats = state.store().list_chats(&user.user_id).await?;
    Ok(Json(chats))
}

pub async fn list_messages(
    State(state): State<Arc<GatewayState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<String>,
) -> GatewayResult<Json<Vec<Message>>> {
    let messages = state.store().list_messages(&chat_id, &user.user_id).await?;
    Ok(Json(messages))
}

pub async fn delete_chat(
    State(state): State<Arc<GatewayState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<String>,
) -> GatewayResult<Json<Chat>> {
    let chat = state.store().delete_chat(&chat_id, &user.user_id).await?;
    info!(chat_id = %chat.id, user_id = %user.user_id, "chat deleted");
    Ok(Json(chat))
}

pub async fn clear_chat(
    State(state): State<Arc<GatewayState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<String>,
) -> GatewayResult<Json<Chat>> {
    let chat = state.store().clear_chat(&chat_id, &user.user_id).await?;
    info!(chat_id = %chat.id, user_id = %user.user_id, "chat cleared");
    Ok(Json(chat))
}
