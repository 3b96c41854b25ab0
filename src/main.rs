//! Chaos operator - runs the ChaosEngine controller

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chaos_operator::config::{OperatorConfig, DEFAULT_ANNOTATION_KEY};
use chaos_operator::controller::lifecycle::{APP_LABEL, CHAOS_UID_LABEL};
use chaos_operator::controller::{error_policy, reconcile, Context};
use chaos_operator::crd::{AnnotationCheck, ChaosEngine};

/// Chaos operator - reconciles ChaosEngine resources into chaos runner pods
#[derive(Parser, Debug)]
#[command(name = "chaos-operator", version, about, long_about = None)]
struct Cli {
    /// Print the ChaosEngine CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ChaosEngine controller (default mode)
    Controller,
}

/// Controller settings, read once at startup
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Runner image used when an engine does not name one
    #[arg(long, global = true, env = "CHAOS_RUNNER_IMAGE")]
    runner_image: Option<String>,

    /// Annotation a target workload must carry to allow chaos
    #[arg(long, global = true, env = "CUSTOM_ANNOTATION", default_value = DEFAULT_ANNOTATION_KEY)]
    annotation_key: Option<String>,

    /// Annotation check applied when an engine leaves it empty (true or false)
    #[arg(long, global = true, env = "DEFAULT_ANNOTATION_CHECK", default_value = "true")]
    default_annotation_check: Option<AnnotationCheck>,

    /// Analytics client id passed to runners
    #[arg(long, global = true, env = "CLIENT_UUID", default_value = "")]
    client_uuid: String,

    /// Only watch engines in this namespace
    #[arg(long, global = true, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Server-side apply the ChaosEngine CRD on startup
    #[arg(long, global = true, env = "INSTALL_CRD")]
    install_crd: bool,
}

impl ControllerArgs {
    fn operator_config(&self) -> OperatorConfig {
        let mut config = OperatorConfig::default()
            .with_runner_image(self.runner_image.clone())
            .with_annotation_key(self.annotation_key.clone());
        if let Some(check) = self.default_annotation_check {
            config.default_annotation_check = check;
        }
        config.client_uuid = self.client_uuid.clone();
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if cli.crd {
        let crd = serde_yaml::to_string(&ChaosEngine::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Install or update the ChaosEngine CRD
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("chaos-operator").force();

    tracing::info!("Installing ChaosEngine CRD...");
    crds.patch(
        "chaosengines.litmuschaos.io",
        &params,
        &Patch::Apply(&ChaosEngine::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ChaosEngine CRD: {}", e))?;
    Ok(())
}

/// Run the ChaosEngine controller until a shutdown signal arrives
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Chaos operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.install_crd {
        ensure_crd_installed(&client).await?;
    }

    let config = args.operator_config();
    tracing::info!(
        annotation_key = %config.annotation_key,
        default_annotation_check = %config.default_annotation_check,
        runner_image = %config.runner_image_override.as_deref().unwrap_or(&config.default_runner_image),
        watch_namespace = ?args.watch_namespace,
        "operator configuration"
    );

    let (engines, pods): (Api<ChaosEngine>, Api<Pod>) = match &args.watch_namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    let ctx = Arc::new(Context::from_client(client, config));

    Controller::new(engines, WatcherConfig::default())
        .watches(
            pods,
            WatcherConfig::default().labels(CHAOS_UID_LABEL),
            |pod: Pod| {
                let engine = pod.labels().get(APP_LABEL)?.clone();
                let namespace = pod.namespace()?;
                Some(ObjectRef::<ChaosEngine>::new(&engine).within(&namespace))
            },
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "ChaosEngine reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "ChaosEngine reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Chaos operator stopped");
    Ok(())
}
