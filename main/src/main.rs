use std::sync::Arc;

use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use common::utils::{
    config::get_config, embedding::EmbeddingProvider, llm::CompletionProvider,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedder = EmbeddingProvider::from_config(&config, Some(Arc::clone(&openai_client)));
    let completer = CompletionProvider::from_config(&config, Some(openai_client));
    info!(
        embedding_backend = embedder.backend_label(),
        embedding_dimension = embedder.dimension(),
        completion_backend = completer.backend_label(),
        "Providers initialized"
    );

    let state = ApiState::new(config.clone(), embedder, completer).await?;

    let app = Router::new()
        .merge(api_routes(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
