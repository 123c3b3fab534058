//! Travel Planner AI
//!
//! A streaming chat backend for a travel-planning assistant. Messages are
//! forwarded to Gemini, reply fragments are relayed to the browser as
//! Server-Sent Events, and each conversation's turns are kept in memory so
//! follow-up questions have context.

pub mod config;
pub mod conversation;
pub mod core;
pub mod providers;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::core::ChatEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chat_engine: Arc<ChatEngine>,
}

/// Full application router with middleware attached
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
