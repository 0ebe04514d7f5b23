//! Directus operator - reconciles Directus deployments on Kubernetes

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, Resource};
use tokio_util::sync::CancellationToken;

use directus_operator::config::ControllerConfig;
use directus_operator::controller::{error_policy, reconcile, Context};
use directus_operator::crd::Directus;
use directus_operator::store::KubeObjectStore;
use directus_operator::telemetry::init_logging;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Directus operator - reconciles Directus custom resources
#[derive(Parser, Debug)]
#[command(name = "directus-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller(ControllerConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Directus::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = match cli.command {
        Some(Commands::Controller(config)) => config,
        None => ControllerConfig::default(),
    };
    init_logging(config.log_format)?;
    run_controller(config).await
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the Directus controller until a shutdown signal arrives
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    tracing::info!("Directus operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, cancelling in-flight passes");
        }
        signal_token.cancel();
    });

    let namespace = config.namespace.clone();
    let ns = namespace.as_deref();
    match ns {
        Some(ns) => tracing::info!(namespace = %ns, "watching a single namespace"),
        None => tracing::info!("watching all namespaces"),
    }

    let ctx = Arc::new(
        Context::builder(Arc::new(KubeObjectStore::new(client.clone())))
            .config(config)
            .shutdown(shutdown)
            .build(),
    );

    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);
    let directuses: Api<Directus> = scoped_api(&client, ns);

    tracing::info!("Starting Directus controller...");
    Controller::new(directuses, watcher())
        .owns(scoped_api::<ServiceAccount>(&client, ns), watcher())
        .owns(scoped_api::<Secret>(&client, ns), watcher())
        .owns(scoped_api::<ConfigMap>(&client, ns), watcher())
        .owns(scoped_api::<Service>(&client, ns), watcher())
        .owns(scoped_api::<Deployment>(&client, ns), watcher())
        .owns(scoped_api::<Ingress>(&client, ns), watcher())
        .owns(scoped_api::<HorizontalPodAutoscaler>(&client, ns), watcher())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => tracing::debug!(?action, "Directus reconciliation completed"),
                Err(e) => tracing::error!(error = ?e, "Directus reconciliation error"),
            }
        })
        .await;

    tracing::info!("Directus operator shutting down");
    Ok(())
}
