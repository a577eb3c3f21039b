use std::env;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use aethermind::config;
use aethermind::modules;
use aethermind::modules::session::orchestrator::ChatOrchestrator;
use aethermind::modules::session::store::{ChatHistoryStore, FileStorage};
use aethermind::services::completion::CompletionClient;
use aethermind::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let completion = CompletionClient::new()?;
    let storage = FileStorage::new(config::storage::data_dir())?;
    let store = ChatHistoryStore::new(Arc::new(storage));
    let orchestrator = ChatOrchestrator::new(Arc::new(completion.clone()), store);

    let state = AppState {
        completion,
        orchestrator,
    };

    let app = Router::new()
        .merge(modules::chat::routes::routes())
        .merge(modules::session::routes::routes())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "aethermind listening");
    axum::serve(listener, app).await?;

    Ok(())
}
