//! API routes

use axum::Router;

use crate::AppState;

mod chat;
mod health;

pub use chat::SESSION_HEADER;

/// Build the router with all endpoints
pub fn api_router() -> Router<AppState> {
    Router::new().merge(chat::router()).merge(health::router())
}
