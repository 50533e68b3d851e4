//! Explicit wiring for the HTTP binary: every collaborator is constructed
//! here, by hand, and handed to the next one — no cached singletons, no
//! service locator (§9 Design Notes calls out the teacher's own dependency
//! style as the model to follow).

use std::sync::Arc;

use anyhow::Context;
use aws_config::BehaviorVersion;
use cellbox_events::EventBus;
use cellbox_exec::{ExecConfig, Orchestrator};
use cellbox_langs::LanguageRegistry;
use cellbox_pool::{HostMaskPaths, SandboxPool};
use cellbox_sandbox::SandboxManager;
use cellbox_server::{build_router, AppState, Cli, ServerConfig};
use cellbox_store::{ColdStore, FileStore, HotStore, RedisHotStore, S3ColdStore, SessionStore, StateStore, StateStoreConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cellbox_common::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).unwrap())
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env().context("loading server configuration")?;

    let registry = Arc::new(LanguageRegistry::default());
    let manager = Arc::new(SandboxManager::new(config.sandboxes_root.clone()));
    let events = EventBus::new();

    let hot: Arc<dyn HotStore> = Arc::new(
        RedisHotStore::connect(&config.redis_url)
            .await
            .context("connecting to the hot key-value store")?,
    );

    let aws_config_builder = aws_config::defaults(BehaviorVersion::latest());
    let aws_config_builder = match &config.s3_endpoint {
        Some(endpoint) => aws_config_builder.endpoint_url(endpoint),
        None => aws_config_builder,
    };
    let aws_shared_config = aws_config_builder.load().await;
    let s3_client = aws_sdk_s3::Client::new(&aws_shared_config);
    let cold: Arc<dyn ColdStore> = Arc::new(S3ColdStore::new(s3_client, config.s3_bucket.clone()));

    let mut pool_config = cellbox_pool::from_env();
    if cli.no_warmup {
        pool_config.warmup_on_startup = false;
    }
    let mask_paths = HostMaskPaths::from_env();

    let pool = SandboxPool::new(Arc::clone(&manager), Arc::clone(&registry), events.clone(), pool_config, mask_paths.clone());
    pool.start();

    let files = Arc::new(FileStore::new(Arc::clone(&hot), Arc::clone(&cold)));
    let sessions = Arc::new(SessionStore::new(Arc::clone(&hot)));
    let states = Arc::new(StateStore::new(hot, cold, StateStoreConfig::default()));
    let exec_config = ExecConfig::from_env();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&pool),
        manager,
        registry,
        events,
        exec_config,
        Arc::clone(&files),
        sessions,
        Arc::clone(&states),
        mask_paths,
    ));

    let state = AppState { orchestrator, files, states };
    let router = build_router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding HTTP listener")?;
    tracing::info!(%addr, "cellbox server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    pool.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
