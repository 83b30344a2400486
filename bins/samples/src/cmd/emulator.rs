use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pubsub_rest::server;
use topic_engine::{EngineConfig, MemoryPubsub};

use crate::config::{EmulatorArgs, Effective};
use crate::error::SamplesError;

pub async fn run(eff: &Effective, args: EmulatorArgs) -> Result<(), SamplesError> {
    let port = args.port.unwrap_or(eff.emulator_port);
    let engine = Arc::new(MemoryPubsub::new(EngineConfig {
        default_ack_deadline: eff.emulator_ack_deadline,
        ..EngineConfig::default()
    }));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let token = CancellationToken::new();

    let serve_token = token.clone();
    let server = tokio::spawn(async move { server::serve(listener, engine, serve_token).await });

    println!("Emulator listening on port {port}; export PUBSUB_EMULATOR_HOST=localhost:{port}");
    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C, shutting down emulator");
    token.cancel();

    match server.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "emulator task failed"),
    }
    Ok(())
}
