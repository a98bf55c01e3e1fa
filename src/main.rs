//! FleetShell - command line front end
//!
//! Lists the devices of a table, compiles per-device scripts, and executes
//! them over SSH while printing timestamped progress lines.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

use fleetshell::catalog::{table_source_for, DeviceCatalog};
use fleetshell::config::{CaptureConfig, HostKeyConfig};
use fleetshell::events::{ProgressEvent, ProgressReporter, TimestampedEvent};
use fleetshell::orchestrator::MergePolicy;
use fleetshell::sink::{ArtifactLayout, ArtifactStore};
use fleetshell::{BatchTask, Config, ConfigLoader, ExecutionOrchestrator, ScriptCompiler};

/// Environment variable that enables debug logging
const DEBUG_ENV_VAR: &str = "FLEETSHELL_DEBUG";

#[derive(Parser, Debug)]
#[command(
    name = "fleetshell",
    version,
    about = "Compile and run command scripts on fleets of network devices",
    after_help = "Configuration is read from --config, $FLEETSHELL_CONFIG, the user config\ndirectory (fleetshell/config.toml), ~/.fleetshell/config.toml or\n./.fleetshell/config.toml, falling back to built-in defaults.\n\nExamples:\n  fleetshell devices devices.xlsx\n  fleetshell compile devices.csv -o out\n  fleetshell execute devices.csv -o out --idle-ms 800 --concurrency 4",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the devices of a table
    Devices {
        /// Device table (.xlsx/.xls/.ods workbook, .csv or .tsv)
        table: PathBuf,
    },
    /// Write one command script per device
    Compile {
        /// Device table (.xlsx/.xls/.ods workbook, .csv or .tsv)
        table: PathBuf,
        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
    /// Write scripts, then run every device's commands over SSH
    Execute(ExecuteArgs),
    /// Write the built-in defaults as a configuration file
    InitConfig {
        /// Target file (`.toml` or `.json`), defaults to the user config directory
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct ExecuteArgs {
    /// Device table (.xlsx/.xls/.ods workbook, .csv or .tsv)
    table: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Devices run at the same time
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Capture each command's output after a fixed delay
    #[arg(long, value_name = "MS", conflicts_with_all = ["idle_ms", "prompt"])]
    delay_ms: Option<u64>,

    /// Capture until the device has been quiet this long
    #[arg(long, value_name = "MS", conflicts_with = "prompt")]
    idle_ms: Option<u64>,

    /// Capture until the last output line matches this pattern
    #[arg(long, value_name = "REGEX")]
    prompt: Option<String>,

    /// How rows sharing a device name are executed
    #[arg(long, value_name = "POLICY", value_parser = parse_merge_policy)]
    merge: Option<MergePolicy>,

    /// Trust any host key (unverified)
    #[arg(long, conflicts_with_all = ["known_hosts", "fingerprint"])]
    accept_any_host_key: bool,

    /// Verify host keys against an OpenSSH known_hosts file
    #[arg(long, value_name = "PATH", conflicts_with = "fingerprint")]
    known_hosts: Option<PathBuf>,

    /// Accept only these SHA256 host key fingerprints
    #[arg(long, value_name = "FP", num_args = 1..)]
    fingerprint: Vec<String>,
}

fn parse_merge_policy(value: &str) -> Result<MergePolicy, String> {
    match value {
        "all-rows" => Ok(MergePolicy::AllRows),
        "last-row" => Ok(MergePolicy::LastRow),
        other => Err(format!(
            "unknown merge policy '{}' (expected all-rows or last-row)",
            other
        )),
    }
}

impl ExecuteArgs {
    /// Fold command line overrides into the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(concurrency) = self.concurrency {
            config.execution.concurrency = concurrency.max(1);
        }
        if let Some(policy) = self.merge {
            config.execution.merge_policy = policy;
        }

        let max_wait_ms = 60_000;
        if let Some(delay_ms) = self.delay_ms {
            config.session.capture = CaptureConfig::FixedDelay { delay_ms };
        } else if let Some(idle_ms) = self.idle_ms {
            config.session.capture = CaptureConfig::IdleTimeout {
                idle_ms,
                max_wait_ms,
            };
        } else if let Some(pattern) = &self.prompt {
            config.session.capture = CaptureConfig::PromptMatch {
                pattern: pattern.clone(),
                poll_ms: 100,
                max_wait_ms,
            };
        }

        if self.accept_any_host_key {
            config.session.host_keys = HostKeyConfig::AcceptAll;
        } else if let Some(path) = &self.known_hosts {
            config.session.host_keys = HostKeyConfig::KnownHostsFile {
                path: Some(path.clone()),
            };
        } else if !self.fingerprint.is_empty() {
            config.session.host_keys = HostKeyConfig::PinnedFingerprint {
                fingerprints: self.fingerprint.clone(),
            };
        }
    }
}

/// Prints each event as a timestamped line
struct PrintReporter;

impl ProgressReporter for PrintReporter {
    fn notify(&self, event: ProgressEvent) {
        print_event(&TimestampedEvent::now(event));
    }
}

fn print_event(event: &TimestampedEvent) {
    if event.event.is_error() {
        eprintln!("{}", event.line());
    } else {
        println!("{}", event.line());
    }
}

fn init_logging(debug: bool) {
    let debug = debug
        || env::var(DEBUG_ENV_VAR).map_or(false, |v| v == "1" || v.to_lowercase() == "true");
    let log_level = if debug { "debug" } else { "warn" };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from(env_filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_catalog(table: &Path, config: &Config) -> anyhow::Result<DeviceCatalog> {
    let source = table_source_for(table);
    PrintReporter.notify(ProgressEvent::LoadStarted {
        source: table.display().to_string(),
    });

    let catalog = match DeviceCatalog::load(source.as_ref(), &config.columns) {
        Ok(catalog) => catalog,
        Err(e) => {
            PrintReporter.notify(ProgressEvent::BatchError {
                message: e.to_string(),
            });
            bail!(fleetshell::handle_startup_error(&e));
        }
    };

    PrintReporter.notify(ProgressEvent::LoadFinished {
        devices: catalog.device_count(),
        executable: catalog.executable_columns_present(),
    });
    if !catalog.executable_columns_present() {
        PrintReporter.notify(ProgressEvent::ExecutionUnavailable {
            missing: catalog.missing_login_columns().to_vec(),
        });
    }
    Ok(catalog)
}

fn list_devices(table: &Path, config: &Config) -> anyhow::Result<ExitCode> {
    let catalog = load_catalog(table, config)?;
    println!("Devices: {}", catalog.device_count());
    for (index, (name, fragments)) in catalog.devices().enumerate() {
        println!("  {:>3}. {} ({} rows)", index + 1, name, fragments.len());
    }
    println!(
        "Execution: {}",
        if catalog.executable_columns_present() {
            "available"
        } else {
            "unavailable"
        }
    );
    Ok(ExitCode::SUCCESS)
}

async fn compile(
    catalog: &DeviceCatalog,
    store: &ArtifactStore,
    config: &Config,
) -> anyhow::Result<bool> {
    let compiler = ScriptCompiler::new(config.script.delimiter.clone());
    let summary = compiler.compile_all(catalog, store, &PrintReporter).await;
    info!(
        "{} scripts written, {} failed",
        summary.written.len(),
        summary.failed.len()
    );
    Ok(summary.failed.is_empty())
}

async fn execute(args: &ExecuteArgs, mut config: Config) -> anyhow::Result<ExitCode> {
    args.apply(&mut config);
    fleetshell::config::loader::validate_config(&config)
        .map_err(|e| anyhow::anyhow!(fleetshell::handle_startup_error(&e)))?;

    let catalog = load_catalog(&args.table, &config)?;
    if !catalog.executable_columns_present() {
        bail!("the device table has no login columns, nothing to execute");
    }

    let store = Arc::new(ArtifactStore::new(
        &args.output,
        ArtifactLayout::from_config(&config),
    ));
    store.reserve(catalog.device_names());
    let scripts_ok = compile(&catalog, &store, &config).await?;

    let orchestrator = ExecutionOrchestrator::from_config(&config)
        .context("failed to set up the SSH session layer")?;
    debug!("Execution settings: {:?}", orchestrator.settings());

    let mut task = BatchTask::start(Arc::new(orchestrator), Arc::new(catalog), store);
    let mut events = task
        .subscribe()
        .context("progress stream already taken")?;

    let cancel = task.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling batch");
            cancel.cancel();
        }
    });

    while let Some(event) = events.recv().await {
        print_event(&event);
    }

    let summary = task.wait().await?;
    println!(
        "Succeeded: {}, failed: {}",
        summary.succeeded(),
        summary.failed()
    );
    Ok(if summary.failed() == 0 && scripts_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<ExitCode> {
    let path = path.unwrap_or_else(ConfigLoader::default_config_path);
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }

    ConfigLoader::new()
        .save_to_path(&Config::default(), &path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Configuration written to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.config;
    let load = || {
        fleetshell::load_config(config_path.as_deref())
            .map_err(|e| anyhow::anyhow!(fleetshell::handle_startup_error(&e)))
    };

    match cli.command {
        Command::Devices { table } => list_devices(&table, &load()?),
        Command::Compile { table, output } => {
            let config = load()?;
            let catalog = load_catalog(&table, &config)?;
            let store = ArtifactStore::new(output, ArtifactLayout::from_config(&config));
            store.reserve(catalog.device_names());
            let ok = compile(&catalog, &store, &config).await?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Command::Execute(args) => execute(&args, load()?).await,
        Command::InitConfig { path, force } => init_config(path, force),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);
    debug!("Starting {} v{}", fleetshell::NAME, fleetshell::VERSION);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
