//! fscan - Watch files and notify listeners when they change.
//!
//! Usage:
//!   fscan run <config>             Run the scheduler until Ctrl+C
//!   fscan validate <config>        Validate a configuration without running
//!   fscan list <config>            List configured jobs and listeners
//!   fscan check <config> <job-id>  Scan one job once and exit

use clap::{Parser, Subcommand};
use filescan::{
    ConfigBuilder, JobId, ListenerConfig, ScanConfig, Scheduler, YamlLoader,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// fscan - Watch files and notify listeners when they change
#[derive(Parser)]
#[command(name = "fscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler with the jobs from a configuration file
    Run {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Scheduler tick interval in milliseconds (overrides the config file)
        #[arg(long)]
        tick_interval_ms: Option<u64>,
    },

    /// Validate a configuration file without running
    Validate {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// List the jobs and listeners in a configuration file
    List {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Scan a single job once and exit
    Check {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Job ID to check
        #[arg(value_name = "JOB_ID")]
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            tick_interval_ms,
        } => {
            run_scheduler(config, tick_interval_ms).await?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::List { config } => {
            list_jobs(config)?;
        }
        Commands::Check { config, job_id } => {
            check_job(config, job_id).await?;
        }
    }

    Ok(())
}

/// Build a scheduler with every job and listener from the configuration.
async fn build_scheduler(
    config: &ScanConfig,
) -> Result<Scheduler<dyn filescan::JobDataStore>, Box<dyn std::error::Error>> {
    let (jobs, context) = ConfigBuilder::build(config)?;
    let store = ConfigBuilder::build_store(config).await?;

    let mut scheduler = Scheduler::with_store(store).with_context(context);
    if let Some(ms) = config.tick_interval_ms {
        scheduler = scheduler.with_tick_interval(Duration::from_millis(ms));
    }
    if let Some(secs) = config.shutdown_timeout_secs {
        scheduler = scheduler.with_shutdown_timeout(Duration::from_secs(secs));
    }
    for job in jobs {
        scheduler.register(job);
    }
    Ok(scheduler)
}

/// Run the scheduler until Ctrl+C.
async fn run_scheduler(
    path: PathBuf,
    tick_interval_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading configuration from: {}", path.display());

    let mut config = YamlLoader::load_config(&path)?;
    if let Some(ms) = tick_interval_ms {
        if ms == 0 {
            return Err("tick interval must be greater than zero".into());
        }
        config.tick_interval_ms = Some(ms);
    }

    if config.jobs.is_empty() {
        warn!("No jobs configured in {}", path.display());
        return Ok(());
    }

    let scheduler = build_scheduler(&config).await?;

    info!("Loaded {} job(s):", config.jobs.len());
    for job in scheduler.jobs() {
        let schedule_info = match job.schedule() {
            Some(schedule) => schedule.expression().to_string(),
            None => "manual only".to_string(),
        };
        let enabled_info = if job.is_enabled() { "" } else { " (disabled)" };
        info!("  - {} ({}){}", job.id(), schedule_info, enabled_info);
    }
    if let Some(state_file) = &config.state_file {
        info!("Persisting job data to {}", state_file.display());
    }

    info!("Starting scheduler");
    info!("Press Ctrl+C to stop");

    let (handle, scheduler_task) = scheduler.start().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            handle.shutdown().await?;
        }
        _ = scheduler_task => {
            info!("Scheduler stopped");
        }
    }

    Ok(())
}

/// Validate a configuration without running.
fn validate_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating configuration: {}", path.display());

    match YamlLoader::load_config(&path) {
        Ok(config) => {
            info!(
                "Configuration is valid: {} job(s), {} listener(s)",
                config.jobs.len(),
                config.listeners.len()
            );
            for job in &config.jobs {
                info!("  - {} -> {}: OK", job.id, job.listener);
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List the configured jobs and listeners.
fn list_jobs(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_config(&path)?;

    if config.listeners.is_empty() && config.jobs.is_empty() {
        println!("Nothing configured in {}", path.display());
        return Ok(());
    }

    println!("Listeners in {}:", path.display());
    for (name, listener) in &config.listeners {
        match listener {
            ListenerConfig::Log => println!("  {} (log)", name),
            ListenerConfig::Command { command, args, .. } => {
                if args.is_empty() {
                    println!("  {} (command: {})", name, command);
                } else {
                    println!("  {} (command: {} {})", name, command, args.join(" "));
                }
            }
        }
    }
    println!();

    println!("Jobs in {}:", path.display());
    println!();
    for job in &config.jobs {
        println!("ID: {}", job.id);
        println!("  File: {}", job.file);
        println!("  Listener: {}", job.listener);
        println!("  Enabled: {}", job.enabled);
        println!(
            "  Schedule: {}",
            job.schedule.as_deref().unwrap_or("manual only")
        );
        if let Some(age) = job.minimum_update_age_ms {
            println!("  Minimum update age: {}ms", age);
        }
        if let Some(retry) = &job.retry {
            println!(
                "  Retry: {} attempt(s), {}s apart",
                retry.max_attempts, retry.delay_secs
            );
        }
        println!();
    }

    Ok(())
}

/// Scan one job once, persisting its data, and report the result.
async fn check_job(path: PathBuf, job_id: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_config(&path)?;

    if !config.jobs.iter().any(|j| j.id == job_id) {
        error!("Job '{}' not found", job_id);
        error!(
            "Available jobs: {}",
            config
                .jobs
                .iter()
                .map(|j| j.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Err(format!("Job '{}' not found", job_id).into());
    }

    let scheduler = build_scheduler(&config).await?;
    let report = scheduler.run_once(&JobId::new(job_id.as_str())).await?;
    // listener commands run in the background and die with the runtime
    scheduler.wait_for_listeners().await;

    match &report.error {
        None => {
            info!("Job '{}' checked (run: {})", report.job_id, report.run_id);
            Ok(())
        }
        Some(e) => {
            error!(
                "Job '{}' failed after {} attempt(s) (run: {}): {}",
                report.job_id, report.attempts, report.run_id, e
            );
            Err(e.clone().into())
        }
    }
}
