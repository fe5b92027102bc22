//! `cert-syncer` keeps a static pod's certificate directory in sync with its ConfigMaps and Secrets
use std::sync::Arc;

use anyhow::Context;
use certsync::{
    config::Options,
    events::{pod_reference, EventRecorder, EventSink, LoggingSink},
    runner, CertSyncController, KubeResourceGetter,
};
use clap::Parser;
use futures::{stream, StreamExt};
use kube::{runtime::events::Reporter, Client};
use tracing::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = Options::parse();
    opts.validate()?;

    let client = Client::try_default()
        .await
        .context("failed to create kube client")?;

    let events: Arc<dyn EventSink> = match &opts.pod_name {
        Some(pod) => Arc::new(EventRecorder::new(
            client.clone(),
            Reporter {
                controller: opts.controller_name.clone(),
                instance: Some(pod.clone()),
            },
            pod_reference(&opts.namespace, pod),
        )),
        None => {
            warn!("no pod name given, events are only logged");
            Arc::new(LoggingSink)
        }
    };

    let controller = CertSyncController::new(
        opts.namespace.clone(),
        opts.destination_dir.clone(),
        opts.config_maps(),
        opts.secrets(),
        Arc::new(KubeResourceGetter::new(client.clone())),
        events,
    );

    let triggers = if opts.no_watch {
        stream::pending().boxed()
    } else {
        runner::resource_triggers(client, &controller)
    };

    info!(
        namespace = %opts.namespace,
        destination = %opts.destination_dir.display(),
        configmaps = controller.config_maps().len(),
        secrets = controller.secrets().len(),
        "starting cert syncer"
    );
    runner::run(&controller, triggers, opts.resync_interval(), shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to listen for ctrl-c");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to listen for SIGTERM");
                futures::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
