//! Gale Operator - batch job lifecycle management for Kubernetes

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gale::controller::{error_policy, reconcile, Context, PodManager};
use gale::crd::GaleJob;
use gale::events::KubeEventPublisher;
use gale::retry::Backoff;
use gale::webhook::webhook_router;
use gale::CONTROLLER_NAME;

/// Gale - CRD-driven batch job orchestration operator for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "gale", version, about, long_about = None)]
struct Cli {
    /// Generate the GaleJob CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the job controller (default mode)
    ///
    /// Watches GaleJob resources and their pods, and drives every job
    /// through its lifecycle state machine.
    Controller,

    /// Serve the validating admission webhook
    ///
    /// Validates GaleJob create/update requests: lifecycle policies,
    /// volumes, and the task dependency DAG.
    Webhook(WebhookArgs),
}

/// Webhook mode arguments
#[derive(Parser, Debug)]
struct WebhookArgs {
    /// Address the webhook server binds to
    #[arg(long, default_value = "0.0.0.0:8443")]
    addr: SocketAddr,

    /// Path to the TLS certificate (PEM)
    #[arg(long, env = "GALE_WEBHOOK_CERT")]
    cert: std::path::PathBuf,

    /// Path to the TLS private key (PEM)
    #[arg(long, env = "GALE_WEBHOOK_KEY")]
    key: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("failed to install default crypto provider");
        std::process::exit(1);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&GaleJob::crd())
            .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {e}"))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Webhook(args)) => run_webhook(args).await,
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Run in controller mode - drives GaleJob lifecycles
async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("gale controller starting");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {e}"))?;

    // The operator installs its own CRD on startup so the stored version
    // always matches the binary.
    ensure_crd_installed(&client).await?;

    let events = Arc::new(KubeEventPublisher::new(client.clone()));
    let pods = Arc::new(PodManager::new(client.clone(), events));
    let ctx = Arc::new(Context {
        client: client.clone(),
        pods,
    });

    let jobs: Api<GaleJob> = Api::all(client.clone());
    let owned_pods: Api<Pod> = Api::all(client.clone());

    Controller::new(jobs, WatcherConfig::default())
        .owns(owned_pods, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "job reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "job reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("gale controller shutting down");
    Ok(())
}

/// Install the GaleJob CRD using server-side apply.
///
/// Retried with backoff: on a fresh cluster the API server may still be
/// settling when the operator starts.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = GaleJob::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| "galejobs.gale.dev".to_string());
    let params = PatchParams::apply(CONTROLLER_NAME).force();

    Backoff::default()
        .retry("install-crd", || async {
            api.patch(&name, &params, &Patch::Apply(&crd)).await
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to install GaleJob CRD: {e}"))?;

    tracing::info!(crd = %name, "GaleJob CRD installed");
    Ok(())
}

/// Run in webhook mode - serves admission validation over TLS
async fn run_webhook(args: WebhookArgs) -> anyhow::Result<()> {
    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&args.cert, &args.key)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load webhook TLS keypair: {e}"))?;

    tracing::info!(addr = %args.addr, "serving admission webhook");

    axum_server::bind_rustls(args.addr, tls)
        .serve(webhook_router().into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("webhook server failed: {e}"))?;

    Ok(())
}
