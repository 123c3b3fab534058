use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use travel_planner_ai::config::Config;
use travel_planner_ai::conversation::ConversationStore;
use travel_planner_ai::core::ChatEngine;
use travel_planner_ai::providers::GeminiProvider;
use travel_planner_ai::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "travel_planner_ai=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.bind_addr()))?;

    let provider = GeminiProvider::new(config.gemini.clone())?;
    tracing::info!("🤖 Using model {}", config.gemini.model);

    let chat_engine = Arc::new(
        ChatEngine::new(Arc::new(provider), ConversationStore::new())
            .with_system_prompt(config.system_prompt.clone()),
    );

    let state = AppState {
        config: Arc::new(config),
        chat_engine,
    };

    let app = build_app(state);

    tracing::info!("✈️  Travel Planner AI running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
