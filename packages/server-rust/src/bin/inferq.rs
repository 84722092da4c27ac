//! `inferq`: HTTP gateway and inference worker in one process.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use clap::Parser;
use inferq_server::bus::MemoryBroker;
use inferq_server::classifier::build_classifier;
use inferq_server::network::{AppState, NetworkModule, ShutdownController};
use inferq_server::observability::{init_tracing, install_prometheus};
use inferq_server::{PipelineConfig, PipelineContext};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::parse();
    init_tracing(&config.log_level, config.log_format)?;

    if let Err(err) = run(config).await {
        error!(error = %format!("{err:#}"), "fatal error");
        return Err(err);
    }
    Ok(())
}

async fn run(config: PipelineConfig) -> anyhow::Result<()> {
    let metrics = install_prometheus()?;
    let classifier = build_classifier(&config.classifier_settings());

    let broker = MemoryBroker::new(config.bus_address.clone(), config.partitions);
    info!(
        bus = broker.address(),
        partitions = config.partitions,
        "using in-process message bus"
    );

    let shutdown = Arc::new(ShutdownController::new());
    let context = PipelineContext::start(&config, &broker, classifier, Arc::clone(&shutdown))
        .await
        .context("pipeline startup failed")?;

    let state = AppState {
        submitter: context.submitter(),
        cache: context.cache(),
        shutdown: Arc::clone(&shutdown),
        metrics: Some(metrics),
        service_name: Arc::from(config.service_name.as_str()),
        start_time: Instant::now(),
    };
    let mut network = NetworkModule::new(config.network(), state);
    let port = network.start().await?;
    info!(service = %config.service_name, port, "gateway listening");

    let served = network.serve(shutdown_signal()).await;
    context.shutdown().await;
    served
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
