use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kmigrate::config::{self, ConfigStore};
use kmigrate::context::AppContext;
use kmigrate::core::{MigrationEngine, RunSummary};
use kmigrate::logging::{self, LogConfig};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "kmigrate")]
#[command(about = "Copy volume data between clusters over local, NFS or sshfs mounts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose console logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Report mounts and copies without performing them
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Use simulated adapters instead of touching the system
    #[arg(long, global = true)]
    simulation: bool,

    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args)]
struct LogArgs {
    /// Emit console logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// File receiving DEBUG logs
    #[arg(long, global = true, default_value = logging::DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Do not write a log file
    #[arg(long, global = true)]
    no_log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the source and destination
    Mount,
    /// Unmount the source and destination
    Unmount,
    /// Copy every mapping entry
    Run(RunArgs),
    /// Validate the configuration and print the resulting job as JSON
    Check,
    /// Edit the mapping stored in the configuration file
    #[command(subcommand)]
    Map(MapCommand),
}

#[derive(Args)]
struct RunArgs {
    /// Mount both sides before copying
    #[arg(long)]
    mount: bool,

    /// Unmount both sides after a successful copy
    #[arg(long)]
    unmount: bool,
}

#[derive(Subcommand)]
enum MapCommand {
    /// Replace the mapping with the given "<source> -> <destination>" entries
    Set { entries: Vec<String> },
    /// Append "<source> -> <destination>" entries to the mapping
    Add { entries: Vec<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        json: cli.log.json_logs,
        verbose: cli.verbose,
        file: (!cli.log.no_log_file).then(|| cli.log.log_file.clone()),
    };
    if let Err(e) = logging::init(log_config) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "kmigrate failed");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let store = ConfigStore::new(&cli.config);

    match &cli.command {
        Commands::Check => run_check(&store),
        Commands::Map(cmd) => run_map(&store, cmd),
        Commands::Mount => {
            let engine = build_engine(&store, cli)?;
            engine.mount_all().await.context("Failed to mount")?;
            Ok(())
        }
        Commands::Unmount => {
            let engine = build_engine(&store, cli)?;
            engine.unmount_all().await.context("Failed to unmount")?;
            Ok(())
        }
        Commands::Run(args) => {
            let engine = build_engine(&store, cli)?;
            run_migration(&engine, args).await
        }
    }
}

fn build_engine(store: &ConfigStore, cli: &Cli) -> Result<MigrationEngine> {
    let config = store.load()?;
    config.validate()?;

    let ctx = AppContext::new(config.into_job(cli.dry_run), cli.simulation);
    if cli.simulation {
        warn!("Simulation mode, no command will touch the system");
    }

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            cancel.cancel();
        }
    });

    Ok(MigrationEngine::new(ctx))
}

async fn run_migration(engine: &MigrationEngine, args: &RunArgs) -> Result<()> {
    if args.mount {
        engine.mount_all().await.context("Failed to mount")?;
    }

    let summary = engine.run().await.context("Migration failed")?;
    report(&summary);

    if args.unmount {
        engine.unmount_all().await.context("Failed to unmount")?;
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        info!(
            label = %outcome.label,
            percent = outcome.percent_complete,
            status = ?outcome.status,
            "Entry result"
        );
    }
    info!(
        run_id = %summary.run_id,
        entries = summary.outcomes.len(),
        dry_run = summary.dry_run,
        "Run finished"
    );
}

fn run_check(store: &ConfigStore) -> Result<()> {
    let config = store.load()?;
    config.validate()?;
    let job = config.into_job(false);
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

fn run_map(store: &ConfigStore, cmd: &MapCommand) -> Result<()> {
    let (entries, append) = match cmd {
        MapCommand::Set { entries } => (entries, false),
        MapCommand::Add { entries } => (entries, true),
    };

    let parsed = entries
        .iter()
        .map(|e| config::parse_mapping_entry(e))
        .collect::<Result<Vec<_>, _>>()?;

    let mut mapping = if append {
        store.load()?.mapping
    } else {
        Vec::new()
    };
    mapping.extend(parsed);

    store
        .save_mapping(&mapping)
        .context("Failed to update mapping")?;
    Ok(())
}
