use std::path::PathBuf;
use std::sync::Arc;

use akeyless_csi_provider::{
    auth::{CloudIdEndpoints, CredentialManager, MetadataCloudIdProvider},
    config::{ConfigResolver, ProviderDefaults, DEFAULT_GATEWAY_URL, DEFAULT_K8S_MOUNT_PATH},
    gateway::HttpGatewayConnector,
    observability::{init_logging, start_health_server, LogFormat},
    server::{serve, version_response, ProviderService},
    Provider, APP_NAME, VERSION,
};
use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "akeyless-csi-provider")]
#[command(about = "Secrets Store CSI driver provider for Akeyless")]
#[command(disable_version_flag = true)]
struct Args {
    /// Path to the unix socket the driver connects to
    #[arg(long, env = "AKEYLESS_PROVIDER_ENDPOINT", default_value = "/tmp/akeyless.vault.sock")]
    endpoint: PathBuf,

    /// Print version information and exit
    #[arg(long)]
    version: bool,

    /// Default Akeyless gateway URL
    #[arg(long, default_value = DEFAULT_GATEWAY_URL)]
    akeyless_address: String,

    /// Default Kubernetes auth mount path
    #[arg(long, default_value = DEFAULT_K8S_MOUNT_PATH)]
    mount: String,

    /// Listen address of the readiness endpoint
    #[arg(long, default_value = ":8080")]
    health_address: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Shutdown listener failed");
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!(signal = "SIGINT", "Shutdown signal received"),
        _ = terminate.recv() => info!(signal = "SIGTERM", "Shutdown signal received"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let args = Args::parse();

    if args.version {
        let version = version_response();
        let printed = serde_json::json!({
            "version": version.version,
            "runtimeName": version.runtime_name,
            "runtimeVersion": version.runtime_version,
        });
        println!("{}", printed);
        return Ok(());
    }

    init_logging(args.log_format, &args.log_level);
    info!(
        app_name = APP_NAME,
        version = VERSION,
        endpoint = %args.endpoint.display(),
        gateway_url = %args.akeyless_address,
        "Starting Akeyless CSI provider"
    );

    let cloud_id = MetadataCloudIdProvider::new(CloudIdEndpoints::default())
        .context("failed to build cloud identity client")?;
    let resolver = ConfigResolver::new(ProviderDefaults {
        gateway_url: args.akeyless_address.clone(),
        k8s_mount_path: args.mount.clone(),
    });
    let provider = Arc::new(Provider::new(
        resolver,
        Arc::new(HttpGatewayConnector::default()),
        CredentialManager::new(Arc::new(cloud_id)),
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.cancel();
        });
    }

    let health = {
        let shutdown = shutdown.clone();
        let address = args.health_address.clone();
        tokio::spawn(async move {
            let result = start_health_server(&address, shutdown.clone()).await;
            if let Err(e) = &result {
                error!(error = %e, "Health listener failed, shutting down");
                shutdown.cancel();
            }
            result
        })
    };

    let service = ProviderService::new(Arc::clone(&provider));
    let served = serve(args.endpoint.clone(), service, shutdown.clone()).await;
    shutdown.cancel();

    provider.shutdown().await;
    let health = health.await.context("health listener task panicked")?;

    served.context("gRPC server failed")?;
    health.context("health listener failed")?;

    info!("Provider shutdown completed");
    Ok(())
}
