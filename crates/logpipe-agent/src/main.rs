// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use anyhow::Context;
use std::env;
use std::future::Future;
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logpipe::{config::PipelineConfig, pipeline::Pipeline, producer::SimulatedProducer};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGPIPE_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if let Err(e) = run().await {
        error!("logpipe agent stopped with an error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("failed to read configuration")?;
    let pipeline = Pipeline::start(config)
        .await
        .context("failed to start pipeline")?;

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let fault = pipeline.fault_token();
    tokio::spawn(async move {
        wait_for_stop(tokio::signal::ctrl_c(), &fault).await;
        stop.cancel();
    });

    let produced = SimulatedProducer::default()
        .run(pipeline.buffer(), &cancel)
        .await;
    info!("produced {produced} records, flushing sinks");

    let report = match pipeline.shutdown().await {
        Ok(report) => report,
        Err(e) => {
            if let Some(remote) = e.remote_stats() {
                info!(
                    "delivered {} remotely before stopping ({} dropped, {} abandoned)",
                    remote.delivered, remote.dropped, remote.abandoned
                );
            }
            return Err(e).context("pipeline shutdown failed");
        }
    };
    info!(
        "wrote {} records to {} files, delivered {} remotely ({} dropped, {} abandoned)",
        report.file.records_written,
        report.file.files_opened,
        report.remote.delivered,
        report.remote.dropped,
        report.remote.abandoned
    );
    Ok(())
}

/// Resolves on the shutdown signal or a file sink fault. If the signal handler cannot be
/// installed, only a fault stops the agent.
async fn wait_for_stop(signal: impl Future<Output = io::Result<()>>, fault: &CancellationToken) {
    tokio::select! {
        signal = signal => match signal {
            Ok(()) => info!("shutdown requested"),
            Err(e) => {
                error!("unable to listen for shutdown signal: {e}");
                fault.cancelled().await;
                error!("file sink failed, stopping log input");
            }
        },
        _ = fault.cancelled() => error!("file sink failed, stopping log input"),
    }
}
