//! stackop - Entry Point
//!
//! Starts, stops and self-updates a docker compose service stack whose
//! deployment descriptor lives in the working directory.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use stackop::app::options::{SupervisorOptions, UpdateOptions};
use stackop::app::run::{cancel_on_signal, run};
use stackop::deploy::compose::ComposeEngine;
use stackop::deploy::git::GitClient;
use stackop::deploy::launcher::SelfLauncher;
use stackop::deploy::stop::stop_stack;
use stackop::deploy::update::{Collaborators, UpdateOutcome, Updater};
use stackop::errors::OpsError;
use stackop::http::client::HttpClient;
use stackop::logs::{init_logging, LogLevel, LogOptions};
use stackop::storage::layout::{default_log_dir, StorageLayout};
use stackop::storage::settings::Settings;
use stackop::utils::{new_session_id, version_info};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "stackop", version, about = "Operate a docker compose service stack")]
struct Cli {
    /// Directory holding the deployment descriptor (defaults to the current directory)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Settings file (defaults to .stackop.json in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[arg(long, global = true, hide = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Wait for the container runtime, start the stack and supervise it
    Start,
    /// Stop the stack
    Stop,
    /// Refresh the descriptor from upstream and restart on change
    Update,
    /// Print version information
    Version,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Start => "start",
            Commands::Stop => "stop",
            Commands::Update => "update",
            Commands::Version => "version",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Print version and exit
    if cli.command == Commands::Version {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{} {}", "[ERROR]".red(), e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let work_dir = match cli
        .work_dir
        .clone()
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .and_then(std::path::absolute)
    {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{} Unable to resolve working directory: {}", "[ERROR]".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut layout = StorageLayout::new(&work_dir)
        .with_log_dir(cli.log_dir.clone().unwrap_or_else(default_log_dir));

    // Retrieve the settings file
    let settings_file = match &cli.config {
        Some(path) => stackop::filesys::file::File::new(path),
        None => layout.settings_file(),
    };
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} Unable to read settings file: {}", "[ERROR]".red(), e);
            return ExitCode::FAILURE;
        }
    };
    layout = layout.with_descriptor_name(settings.descriptor_name.clone());

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli.log_level.clone().unwrap_or_else(|| settings.log_level.clone()),
        log_file: Some(layout.log_file().path().to_path_buf()),
        rotate_bytes: settings.log_rotate_bytes,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    info!(
        "=== stackop {} session {} started at {} in {} ===",
        cli.command.name(),
        new_session_id(),
        chrono::Local::now().to_rfc3339(),
        layout.work_dir.display()
    );

    let result = match cli.command {
        Commands::Start => start(&layout, &settings).await,
        Commands::Stop => stop(&layout).await,
        Commands::Update => update(&layout, &settings, supervisor_args(&cli, &layout)).await,
        Commands::Version => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("stackop {} failed: {}", cli.command.name(), e);
            eprintln!("{} {}", "[ERROR]".red(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn compose_engine(layout: &StorageLayout) -> ComposeEngine {
    ComposeEngine::new(&layout.work_dir, layout.descriptor_file().path())
}

async fn start(layout: &StorageLayout, settings: &Settings) -> Result<(), OpsError> {
    let engine = compose_engine(layout);
    let shutdown = CancellationToken::new();
    let _signals = cancel_on_signal(shutdown.clone())?;

    run(
        &engine,
        layout,
        &SupervisorOptions::from(settings),
        shutdown,
        tokio::time::sleep,
    )
    .await
}

async fn stop(layout: &StorageLayout) -> Result<(), OpsError> {
    stop_stack(&compose_engine(layout), layout).await?;
    println!("{} Stack stopped", "[OK]".green());
    Ok(())
}

async fn update(
    layout: &StorageLayout,
    settings: &Settings,
    supervisor_args: Vec<OsString>,
) -> Result<(), OpsError> {
    let engine = compose_engine(layout);
    let vcs = GitClient::new(&layout.work_dir);
    let fetcher = HttpClient::new(DOWNLOAD_TIMEOUT)?;
    let launcher = SelfLauncher::current(&layout.work_dir, supervisor_args)?;
    let options = UpdateOptions::from(settings);

    let deps = Collaborators {
        engine: &engine,
        vcs: &vcs,
        fetcher: &fetcher,
        launcher: &launcher,
    };
    let report = Updater::new(layout, &options, deps, tokio::time::sleep)
        .run()
        .await?;

    for warning in &report.warnings {
        println!("{} {}", "[WARN]".yellow(), warning);
    }
    match report.outcome {
        UpdateOutcome::UpToDate => println!("{} No update needed", "[OK]".green()),
        UpdateOutcome::Updated { version } => println!(
            "{} {} updated{}",
            "[OK]".green(),
            layout.descriptor_name,
            version.map(|v| format!(" to {}", v)).unwrap_or_default()
        ),
    }
    Ok(())
}

/// Global flags the background supervisor must inherit from this invocation
fn supervisor_args(cli: &Cli, layout: &StorageLayout) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--work-dir".into(),
        layout.work_dir.clone().into_os_string(),
        "--log-dir".into(),
        layout.log_dir.clone().into_os_string(),
    ];
    if let Some(config) = &cli.config {
        let config = std::path::absolute(config).unwrap_or_else(|_| config.clone());
        args.push("--config".into());
        args.push(config.into_os_string());
    }
    if let Some(level) = &cli.log_level {
        args.push("--log-level".into());
        args.push(level.to_filter_string().into());
    }
    args
}
