//! stackmount - mount a remote directory and its decrypted view
//!
//! Usage:
//!   stackmount [mount]   - Mount the remote host, then the decrypted view
//!   stackmount unmount   - Unmount the decrypted view, then the remote host
//!   stackmount status    - Show the resolved configuration and mount state

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use stackmount::{
    config::{Config, Environment},
    driver::SystemDriver,
    MountOrchestrator, MountPaths, MountState,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit status for help, version and usage errors
const EXIT_USAGE: i32 = 2;

#[derive(Parser)]
#[command(name = "stackmount")]
#[command(version)]
#[command(about = "Mount a remote directory over SSH and expose its decrypted view")]
struct Cli {
    /// Configuration file path [env: STACKMOUNTRC] [default: ~/.stackmountrc]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Kill an external mount tool still running after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the remote host and the decrypted view (default)
    Mount,

    /// Unmount the decrypted view, then the remote host
    Unmount,

    /// Show the resolved configuration and which layers are mounted
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct StatusReport<'a> {
    config: &'a Config,
    paths: &'a MountPaths,
    state: MountState,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_USAGE);
        }
    };

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let env = Environment::from_process();
    let config =
        Config::load(&env, cli.config.as_deref()).context("Failed to resolve configuration")?;
    let paths = MountPaths::derive(&config);

    let mut driver = SystemDriver::default();
    if let Some(secs) = cli.timeout {
        driver = driver.with_timeout(Duration::from_secs(secs));
    }
    let mut orchestrator = MountOrchestrator::new(driver);

    match cli.command.unwrap_or(Commands::Mount) {
        Commands::Mount => cmd_mount(&mut orchestrator, &config, &paths),
        Commands::Unmount => cmd_unmount(&mut orchestrator, &paths),
        Commands::Status { json } => cmd_status(&mut orchestrator, &config, &paths, json),
    }
}

fn cmd_mount(
    orchestrator: &mut MountOrchestrator<SystemDriver>,
    config: &Config,
    paths: &MountPaths,
) -> anyhow::Result<()> {
    orchestrator
        .perform_mount(config, paths)
        .with_context(|| format!("Failed to mount {}", config.remote_host()))?;

    info!("Mounted {:?}", paths.decrypted_path);
    Ok(())
}

fn cmd_unmount(
    orchestrator: &mut MountOrchestrator<SystemDriver>,
    paths: &MountPaths,
) -> anyhow::Result<()> {
    // Any failed layer makes the whole command fail, even if the other came down.
    orchestrator.perform_unmount(paths)?;

    info!("Unmounted successfully");
    Ok(())
}

fn cmd_status(
    orchestrator: &mut MountOrchestrator<SystemDriver>,
    config: &Config,
    paths: &MountPaths,
    json: bool,
) -> anyhow::Result<()> {
    let state = orchestrator.state(paths)?;

    if json {
        let report = StatusReport {
            config,
            paths,
            state,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("stackmount Status");
    println!("=================");
    println!();
    println!("Remote host: {}", config.remote_host());
    println!("Remote root: {}", config.remote_root());
    println!("Host mountpoint: {:?}", paths.host_mountpoint);
    println!("Encrypted directory: {:?}", paths.encrypted_path);
    println!("Decrypted view: {:?}", paths.decrypted_path);
    println!(
        "State: {}",
        match state {
            MountState::Unmounted => "not mounted",
            MountState::HostMounted => "remote host mounted, decrypted view NOT mounted",
            MountState::FullyMounted => "mounted",
            MountState::DataOnly => "decrypted view mounted WITHOUT the remote host",
        }
    );

    Ok(())
}
