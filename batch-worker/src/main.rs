//! Receive SQS batches over HTTP and answer with the messages to redeliver.
use envconfig::Envconfig;
use eyre::Result;

use batch_common::metrics::setup_metrics_recorder;
use batch_worker::config::Config;
use batch_worker::error::WorkerError;
use batch_worker::server::{graceful_shutdown, serve};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let metrics = if config.export_prometheus {
        Some(setup_metrics_recorder()?)
    } else {
        None
    };

    let bind = config.bind();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|error| WorkerError::BindError { bind, error })?;

    serve(config, listener, metrics, graceful_shutdown()).await?;

    Ok(())
}
