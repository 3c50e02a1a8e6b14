//! REST endpoints for chat management and attachment uploads.

pub mod chat;
pub mod health;
pub mod messages;

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};

use crate::middleware::auth_middleware;
use crate::state::GatewayState;

pub fn create_rest_routes(state: Arc<GatewayState>) -> Router<Arc<GatewayState>> {
    Router::new()
        .merge(
            chat::create_chat_routes()
                .merge(messages::create_message_routes())
                .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware)),
        )
        .route("/health", get(health::health_check))
}
