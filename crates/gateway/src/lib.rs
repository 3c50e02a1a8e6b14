//! # Parlor Gateway
//!
//! HTTP and WebSocket surface of the Parlor backend.
//!
//! - **WebSocket** (`GET /ws?token=`): authenticated realtime sessions driven
//!   by the [`parlor_realtime::DeliveryEngine`].
//! - **REST**: chat creation, listing, history, deletion and clearing behind
//!   bearer authentication, plus `GET /health`.

pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{GatewayError, GatewayResult};
pub use middleware::auth_middleware;
pub use state::GatewayState;

use std::sync::Arc;

use axum::Router;

/// Build the application router with all routes and cross-cutting layers.
pub fn create_router(state: GatewayState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .merge(rest::create_rest_routes(state.clone()))
        .merge(websocket::create_websocket_routes())
        .layer(middleware::create_trace_middleware())
        .layer(middleware::create_cors_middleware())
        .with_state(state)
}
