#[path = "animegen_relay/cli.rs"]
mod cli;

use std::sync::Arc;

use animegen_relay::gateway::{RelayHttpState, init_tracing, router};
use animegen_relay::{Env, GenerationOrchestrator, RelayConfig, RelayConfigFile, ReplicateClient};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::RelayCli::parse();
    init_tracing(args.json_logs)?;

    let file = match args.config.as_deref() {
        Some(path) => RelayConfigFile::load(path).await?,
        None => RelayConfigFile::default(),
    };
    let env = match args.dotenv.as_deref() {
        Some(path) => Env::parse_dotenv(&tokio::fs::read_to_string(path).await?),
        None => Env::process(),
    };

    let mut config = RelayConfig::resolve(&file, &env)?;
    if let Some(listen) = args.listen {
        config = config.with_listen(listen);
    }

    let provider = ReplicateClient::from_config(&config)?;
    let orchestrator =
        GenerationOrchestrator::new(Arc::new(provider), config.model_version.clone());
    let app = router(RelayHttpState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!(
        listen = %listener.local_addr()?,
        provider_base_url = %config.base_url,
        model_version = %config.model_version,
        api_key_configured = !config.api_key.expose().is_empty(),
        "animegen-relay listening"
    );
    tracing::info!(
        "endpoints: GET / (server info), GET /health, POST /generate-anime, POST /generate-test"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("animegen-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
