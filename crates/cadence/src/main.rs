use cadence_controller::{
    BackoffConfig, ChaosPodPolicy, Controller, ControllerConfig, Engine, FooPolicy, ManagedChild,
    ScheduleRule,
};
use cadence_core::{documents_from_yaml, ChaosPod, Deployment, Foo, Pod, Resource, Scheme};
use cadence_store::{ClusterClient, ClusterStore, StoreError};
use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, WrapErr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cadence", about = "Level-triggered reconciliation controllers")]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text", env = "CADENCE_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ControllerKind {
    Chaospod,
    Foo,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controllers against the embedded store
    Run {
        /// Path to the redb database file
        #[arg(long, default_value = "./cadence.redb", env = "CADENCE_DATA_DIR")]
        data_dir: PathBuf,
        /// Manifests to load before the controllers start
        #[arg(long)]
        manifest: Vec<PathBuf>,
        /// Concurrent reconcile workers per controller
        #[arg(long, default_value_t = 2)]
        workers: usize,
        /// Seed for the stop schedule; random when omitted
        #[arg(long, env = "CADENCE_SEED")]
        seed: Option<u64>,
        /// Base interval in seconds between ChaosPod stops
        #[arg(long, default_value_t = 10)]
        stop_base: u64,
        /// Smallest and largest multiple of the base, e.g. "1,2"
        #[arg(long, default_value = "1,2", value_parser = parse_multiples)]
        stop_multiples: [u32; 2],
        /// Full schedule rule as JSON; overrides --stop-base/--stop-multiples
        #[arg(long, env = "CADENCE_SCHEDULE")]
        schedule: Option<String>,
        /// Delay in milliseconds after a first failure
        #[arg(long, default_value_t = 5)]
        backoff_base_ms: u64,
        /// Upper bound in seconds for failure backoff
        #[arg(long, default_value_t = 1000)]
        backoff_max_secs: u64,
        /// Controllers to run
        #[arg(long, value_enum, value_delimiter = ',', default_value = "chaospod,foo")]
        controllers: Vec<ControllerKind>,
    },
    /// Load manifests into the store and exit
    Apply {
        /// Path to the redb database file
        #[arg(long, default_value = "./cadence.redb", env = "CADENCE_DATA_DIR")]
        data_dir: PathBuf,
        /// Manifests to load
        #[arg(long, required = true)]
        manifest: Vec<PathBuf>,
    },
    /// Print the store's commit log
    History {
        /// Path to the redb database file
        #[arg(long, default_value = "./cadence.redb", env = "CADENCE_DATA_DIR")]
        data_dir: PathBuf,
        /// Only commits touching this storage key, e.g. apps/v1/Deployment/default/web
        #[arg(long)]
        object: Option<String>,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let scheme = Scheme::with_defaults()?.install()?;

    match cli.command {
        Commands::Run {
            data_dir,
            manifest,
            workers,
            seed,
            stop_base,
            stop_multiples,
            schedule,
            backoff_base_ms,
            backoff_max_secs,
            controllers,
        } => {
            let rule = match schedule {
                Some(json) => serde_json::from_str(&json)
                    .into_diagnostic()
                    .wrap_err("Invalid --schedule rule")?,
                None => ScheduleRule::DiscreteMultiples {
                    base: Duration::from_secs(stop_base),
                    multiples: stop_multiples,
                },
            };
            let config = ControllerConfig {
                workers,
                backoff: BackoffConfig {
                    base: Duration::from_millis(backoff_base_ms),
                    max: Duration::from_secs(backoff_max_secs),
                },
            };
            run_controllers(
                scheme,
                &data_dir,
                &manifest,
                rule,
                seed,
                config,
                &controllers,
            )
            .await
        }
        Commands::Apply { data_dir, manifest } => {
            let store = open_store(&data_dir)?;
            for path in &manifest {
                apply_manifest(&store, scheme, path).await?;
            }
            Ok(())
        }
        Commands::History { data_dir, object } => print_history(&data_dir, object.as_deref()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn parse_multiples(value: &str) -> Result<[u32; 2], String> {
    let (lo, hi) = value
        .split_once(',')
        .ok_or_else(|| format!("expected two comma-separated numbers, got '{}'", value))?;
    let lo = lo.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let hi = hi.trim().parse::<u32>().map_err(|e| e.to_string())?;
    Ok([lo, hi])
}

fn open_store(data_dir: &Path) -> miette::Result<Arc<ClusterStore>> {
    let store = ClusterStore::open(data_dir)
        .wrap_err_with(|| format!("Failed to open store at '{}'", data_dir.display()))?;
    Ok(Arc::new(store))
}

/// Load manifests, then run the selected controllers until ctrl-c
async fn run_controllers(
    scheme: &'static Scheme,
    data_dir: &Path,
    manifests: &[PathBuf],
    rule: ScheduleRule,
    seed: Option<u64>,
    config: ControllerConfig,
    kinds: &[ControllerKind],
) -> miette::Result<()> {
    info!("Starting cadence");

    let store = open_store(data_dir)?;
    for path in manifests {
        apply_manifest(&store, scheme, path).await?;
    }

    let scheme = Arc::new(scheme.clone());
    let token = CancellationToken::new();
    let mut handles = Vec::new();

    if kinds.contains(&ControllerKind::Chaospod) {
        let policy = ChaosPodPolicy::new(rule)?;
        handles.push(spawn_controller(
            policy,
            &store,
            &scheme,
            seed,
            config.clone(),
            &token,
        ));
    }
    if kinds.contains(&ControllerKind::Foo) {
        handles.push(spawn_controller(
            FooPolicy,
            &store,
            &scheme,
            seed,
            config.clone(),
            &token,
        ));
    }
    if handles.is_empty() {
        warn!("No controllers selected");
    }

    info!("All controllers started");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    let drained = tokio::time::timeout(shutdown_timeout, async {
        for handle in handles {
            let _ = handle.await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Controllers did not stop within {:?}", shutdown_timeout);
    }

    info!("Shutdown complete");
    Ok(())
}

fn spawn_controller<P: ManagedChild>(
    policy: P,
    store: &Arc<ClusterStore>,
    scheme: &Arc<Scheme>,
    seed: Option<u64>,
    config: ControllerConfig,
    token: &CancellationToken,
) -> JoinHandle<()> {
    let engine = Engine::new(policy, store.clone());
    let engine = match seed {
        Some(seed) => engine.with_seed(seed),
        None => engine,
    };
    let controller = Arc::new(Controller::new(Arc::new(engine), scheme.clone(), config));

    let events = store.subscribe();
    let token = token.clone();
    tokio::spawn(async move {
        if let Err(e) = controller.run(events, token).await {
            error!("{} controller error: {}", P::NAME, e);
        }
    })
}

/// Create every object of a manifest that does not exist yet
async fn apply_manifest(store: &ClusterStore, scheme: &Scheme, path: &Path) -> miette::Result<()> {
    let data = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read manifest '{}'", path.display()))?;

    for document in documents_from_yaml(&data)? {
        let key = scheme.key_of(&document)?;
        if key.gvk == ChaosPod::gvk() {
            create_if_absent::<ChaosPod>(store, document).await?;
        } else if key.gvk == Foo::gvk() {
            create_if_absent::<Foo>(store, document).await?;
        } else if key.gvk == Pod::gvk() {
            create_if_absent::<Pod>(store, document).await?;
        } else if key.gvk == Deployment::gvk() {
            create_if_absent::<Deployment>(store, document).await?;
        }
    }

    info!("Applied manifest {}", path.display());
    Ok(())
}

async fn create_if_absent<T: Resource>(
    store: &ClusterStore,
    document: serde_json::Value,
) -> miette::Result<()> {
    let object: T = serde_json::from_value(document)
        .into_diagnostic()
        .wrap_err_with(|| format!("Malformed {} document", T::KIND))?;

    match store.create(object).await {
        Ok(created) => {
            if let Ok(key) = created.resource_key() {
                info!("Created {}", key);
            }
            Ok(())
        }
        Err(StoreError::AlreadyExists { key }) => {
            info!("{} already exists, leaving it untouched", key);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_history(data_dir: &Path, object: Option<&str>) -> miette::Result<()> {
    let store = open_store(data_dir)?;
    let versions = store.version_store();
    let commits = match object {
        Some(key) => versions.history_of(key)?,
        None => versions.list_commits()?,
    };

    for commit in commits {
        println!(
            "{:>6}  {}  {}  {}",
            commit.sequence,
            commit.id(),
            commit.timestamp.to_rfc3339(),
            commit.message
        );
    }
    Ok(())
}
