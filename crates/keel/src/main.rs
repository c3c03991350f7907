use clap::{Args, Parser, Subcommand, ValueEnum};
use keel_controller::{
    BackoffConfig, Client, ClusterController, ControllerConfig, KubeconfigProber,
    KubeconfigProberConfig, ProbeMode, Reconciler, ReconcilerConfig,
};
use keel_core::{Cluster, ObjectKey, Scheme};
use keel_storage::{KvObjectStore, ObjectStore, RedbBackend, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "keel", about = "Keel Cluster lifecycle controller")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "KEEL_LOG_FORMAT", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the store and reconcile Clusters until interrupted
    Run {
        #[command(flatten)]
        opts: ReconcileOpts,
        /// Number of concurrent reconcile workers
        #[arg(long, default_value_t = 4, env = "KEEL_WORKERS")]
        workers: usize,
        /// Deadline for a single reconcile
        #[arg(long, default_value_t = 60, env = "KEEL_RECONCILE_TIMEOUT_SECS")]
        reconcile_timeout_secs: u64,
    },
    /// Run one reconcile cycle for a Cluster and print the result
    Reconcile {
        #[command(flatten)]
        opts: ReconcileOpts,
        /// Namespace of the Cluster
        #[arg(long, default_value = "default")]
        namespace: String,
        /// Name of the Cluster
        name: String,
    },
}

#[derive(Args)]
struct ReconcileOpts {
    /// Path to the redb database file
    #[arg(long, default_value = "./keel.redb", env = "KEEL_DB_PATH")]
    db_path: PathBuf,
    /// How workload cluster connectivity is probed
    #[arg(long, value_enum, default_value_t = ProbeArg::Secret, env = "KEEL_PROBE_MODE")]
    probe_mode: ProbeArg,
    /// Retry interval while the workload cluster is unreachable
    #[arg(long, default_value_t = 10, env = "KEEL_PROBE_RETRY_SECS")]
    probe_retry_secs: u64,
    /// Requeue interval while deletion waits on descendants
    #[arg(long, default_value_t = 5, env = "KEEL_DELETION_REQUEUE_SECS")]
    deletion_requeue_secs: u64,
    /// Delete provider objects without waiting for the ok-to-delete annotation
    #[arg(long, env = "KEEL_NO_DELETION_APPROVAL")]
    no_deletion_approval: bool,
    /// Serve an extra provider group at a version (GROUP=VERSION)
    #[arg(long = "contract", value_parser = parse_contract)]
    contracts: Vec<(String, String)>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProbeArg {
    Secret,
    Healthz,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    match cli.command {
        Commands::Run {
            opts,
            workers,
            reconcile_timeout_secs,
        } => run_controller(&opts, workers, reconcile_timeout_secs).await,
        Commands::Reconcile {
            opts,
            namespace,
            name,
        } => run_once(&opts, &namespace, &name).await,
    }
}

/// Run the controller until ctrl-c
async fn run_controller(
    opts: &ReconcileOpts,
    workers: usize,
    reconcile_timeout_secs: u64,
) -> miette::Result<()> {
    info!("Starting keel controller");

    let store = open_store(&opts.db_path)?;
    let reconciler = create_reconciler(opts, Client::new(store.clone()));
    let config = ControllerConfig {
        workers,
        reconcile_timeout: Duration::from_secs(reconcile_timeout_secs),
        backoff: BackoffConfig::default(),
    };
    let controller = ClusterController::new(reconciler, store, config);

    let token = CancellationToken::new();
    let controller_token = token.clone();
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run(controller_token).await {
            error!("Cluster controller error: {}", e);
        }
    });

    info!(
        "Controller started with {} workers, database at {}",
        workers,
        opts.db_path.display()
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    if tokio::time::timeout(shutdown_timeout, controller_handle)
        .await
        .is_err()
    {
        error!("Controller did not stop within {:?}", shutdown_timeout);
    }

    info!("Shutdown complete");

    Ok(())
}

/// Reconcile one Cluster and print it as YAML
async fn run_once(opts: &ReconcileOpts, namespace: &str, name: &str) -> miette::Result<()> {
    let store = open_store(&opts.db_path)?;
    let client = Client::new(store);
    let reconciler = create_reconciler(opts, client.clone());

    let key = ObjectKey::new(namespace, name);
    let action = reconciler
        .reconcile(&key)
        .await
        .map_err(|e| miette::miette!("Reconcile of {} failed: {}", key, e))?;
    if let Some(after) = action.requeue_after {
        info!("Cluster {} wants another reconcile in {:?}", key, after);
    }

    match client
        .get_opt::<Cluster>(&key)
        .await
        .map_err(|e| miette::miette!("Failed to read cluster {}: {}", key, e))?
    {
        Some(cluster) => {
            let yaml = keel_core::to_yaml(&cluster)
                .map_err(|e| miette::miette!("Failed to render cluster {}: {}", key, e))?;
            print!("{}", yaml);
        }
        None => info!("Cluster {} no longer exists", key),
    }
    Ok(())
}

/// Open the object store over the redb file at `db_path`
fn open_store(db_path: &Path) -> miette::Result<Arc<dyn ObjectStore>> {
    let backend = Arc::new(RedbBackend::new(db_path).map_err(|e| {
        miette::miette!("Failed to open storage at '{}': {}", db_path.display(), e)
    })?);
    Ok(Arc::new(KvObjectStore::new(backend, StoreConfig::default())))
}

fn create_reconciler(opts: &ReconcileOpts, client: Client) -> Reconciler {
    let mode = match opts.probe_mode {
        ProbeArg::Secret => ProbeMode::SecretPresence,
        ProbeArg::Healthz => ProbeMode::Healthz,
    };
    let prober = KubeconfigProber::new(
        client.clone(),
        KubeconfigProberConfig {
            mode,
            ..Default::default()
        },
    );

    let scheme = opts
        .contracts
        .iter()
        .fold(Scheme::cluster_api_defaults(), |scheme, (group, version)| {
            scheme.with_group(group, version)
        });

    let config = ReconcilerConfig {
        probe_retry_interval: Duration::from_secs(opts.probe_retry_secs),
        deletion_requeue_interval: Duration::from_secs(opts.deletion_requeue_secs),
        require_deletion_approval: !opts.no_deletion_approval,
    };

    Reconciler::new(client, Arc::new(prober), Arc::new(scheme), config)
}

fn parse_contract(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((group, version)) if !group.is_empty() && !version.is_empty() => {
            Ok((group.to_string(), version.to_string()))
        }
        _ => Err(format!("expected GROUP=VERSION, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contract() {
        assert_eq!(
            parse_contract("infrastructure.example.com=v1alpha1").unwrap(),
            (
                "infrastructure.example.com".to_string(),
                "v1alpha1".to_string()
            )
        );
        assert!(parse_contract("infrastructure.example.com").is_err());
        assert!(parse_contract("=v1").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "keel",
            "run",
            "--db-path",
            "/tmp/keel.redb",
            "--workers",
            "2",
            "--no-deletion-approval",
            "--contract",
            "infrastructure.example.com=v1alpha1",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { opts, workers, .. } => {
                assert_eq!(opts.db_path, PathBuf::from("/tmp/keel.redb"));
                assert_eq!(workers, 2);
                assert!(opts.no_deletion_approval);
                assert_eq!(opts.contracts.len(), 1);
            }
            Commands::Reconcile { .. } => panic!("expected run"),
        }
    }
}
