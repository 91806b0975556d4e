mod config;
mod db;
mod errors;
mod interview;
mod llm_client;
mod models;
mod routes;
mod selection;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::interview::service::InterviewService;
use crate::llm_client::anthropic::AnthropicBackend;
use crate::llm_client::chain::FallbackChain;
use crate::llm_client::openai_compat::OpenAiCompatBackend;
use crate::llm_client::ReasoningBackend;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::{PgQuestionStore, PgRoleProfileStore, PgSessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize the reasoning backend chain. Both keys are optional; with
    // neither set, every turn resolves through the deterministic path.
    let primary: Option<Arc<dyn ReasoningBackend>> = config
        .anthropic_api_key
        .clone()
        .map(|key| Arc::new(AnthropicBackend::new(key)) as Arc<dyn ReasoningBackend>);
    let secondary: Option<Arc<dyn ReasoningBackend>> = config.groq_api_key.clone().map(|key| {
        Arc::new(OpenAiCompatBackend::new(key, config.groq_base_url.clone()))
            as Arc<dyn ReasoningBackend>
    });
    info!(
        primary = primary.is_some(),
        secondary = secondary.is_some(),
        "reasoning backends configured"
    );
    let chain = FallbackChain::new(primary, secondary)
        .with_timeout(Duration::from_secs(config.backend_timeout_secs));

    // Wire the interview service against Postgres-backed stores
    let interview = InterviewService::new(
        Arc::new(PgQuestionStore::new(db.clone())),
        Arc::new(PgSessionStore::new(db.clone())),
        Arc::new(PgRoleProfileStore::new(db)),
        Arc::new(chain),
    );

    let state = AppState {
        interview: Arc::new(interview),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
