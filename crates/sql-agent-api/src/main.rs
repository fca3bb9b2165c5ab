use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use sql_agent_api::config::{CacheBackend, LongTermBackend, Settings};
use sql_agent_api::memory::{
    CacheStore, InMemoryCacheStore, InMemoryLongTermStore, LongTermStore, MemoryManager,
    PgLongTermStore, RedisCacheStore,
};
use sql_agent_api::router::build_router;
use sql_agent_api::services::{AgentGateway, LlmAgent};
use sql_agent_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,sql_agent_api=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting SQL Agent API...");

    // Load configuration; never start half-configured
    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("✅ Configuration loaded");

    // Short-term memory / response cache
    let cache: Arc<dyn CacheStore> = match settings.cache.backend {
        CacheBackend::Redis => {
            Arc::new(RedisCacheStore::connect(&settings.cache.connection_url()).await?)
        }
        CacheBackend::Memory => Arc::new(InMemoryCacheStore::new()),
    };
    info!("✅ Cache store ready ({:?})", settings.cache.backend);

    // Long-term memory
    let long_term: Arc<dyn LongTermStore> = match settings.long_term.backend {
        LongTermBackend::Postgres => Arc::new(
            PgLongTermStore::connect(
                &settings.long_term.url,
                settings.long_term.max_connections,
                &settings.long_term.table,
            )
            .await?,
        ),
        LongTermBackend::Memory => Arc::new(InMemoryLongTermStore::new()),
    };
    info!("✅ Long-term store ready ({:?})", settings.long_term.backend);

    let memory = Arc::new(MemoryManager::new(cache, long_term, settings.memory.clone()));

    let agent: Arc<dyn AgentGateway> = Arc::new(LlmAgent::new(settings.agent.clone())?);
    info!(
        "✅ Agent initialized (model: {}, database: {})",
        settings.agent.model,
        settings.agent.database.target()
    );

    let state = AppState::new(memory, agent, settings.agent.render_system_prompt());
    let app = build_router(state);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
