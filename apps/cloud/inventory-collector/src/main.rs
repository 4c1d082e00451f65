//! Inventory Collector
//!
//! Enumerates the resources of a cloud account across regions, prices them
//! and caches the rendered inventory per subject. Runs against the cloud
//! gateway, or offline against a JSON fixture.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::FromEnv;
use domain_inventory::{CachedView, DeployRequest};
use domain_jobs::{JobKind, JobState, JobStatus};
use eyre::{bail, eyre, Result};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use std::time::Duration;
use tracing::info;

mod app;
mod config;

use app::App;
use config::Config;

#[derive(Parser)]
#[command(name = "inventory-collector")]
#[command(about = "Enumerate, price and cache the resources of a cloud account")]
struct Cli {
    /// Serve the account from a JSON fixture instead of the cloud gateway
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Regions to collect. Defaults to configured regions.
    #[arg(short = 'R', long, value_delimiter = ',', global = true)]
    regions: Option<Vec<String>>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collection pass and print the report
    Collect,

    /// Refresh a subject's inventory as a background job and wait for it
    Refresh {
        #[arg(short, long, default_value = "default")]
        subject: String,

        /// Status polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },

    /// Rebuild a subject's billing summary and wait for it
    Billing {
        #[arg(short, long, default_value = "default")]
        subject: String,

        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },

    /// Launch an instance serving a repository and wait until it answers
    Deploy {
        #[arg(short, long, default_value = "default")]
        subject: String,

        /// Name tag of the new instance
        #[arg(long)]
        name: String,

        #[arg(long)]
        repository_url: String,

        /// Region to launch in. Defaults to the first collected region.
        #[arg(long)]
        region: Option<String>,

        #[arg(long, default_value = "t3.micro")]
        instance_type: String,

        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },

    /// List bucket names, or the keys of one bucket
    Ls {
        bucket: Option<String>,
    },

    /// Fetch one object
    Get {
        bucket: String,
        key: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the status of a subject's job
    Status {
        #[arg(short, long, default_value = "default")]
        subject: String,

        #[arg(short, long, default_value = "refresh")]
        kind: JobKind,
    },

    /// Print a subject's cached inventory
    Show {
        #[arg(short, long, default_value = "default")]
        subject: String,
    },

    /// Drop a finished job's status row
    Acknowledge {
        #[arg(short, long, default_value = "default")]
        subject: String,

        #[arg(short, long, default_value = "refresh")]
        kind: JobKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    observability::init_metrics();

    let cli = Cli::parse();
    let app = App::build(config, cli.fixture.as_deref(), cli.regions).await?;

    let outcome = run(&app, cli.command).await;

    if cli.metrics {
        eprintln!("{}", observability::render_metrics());
    }

    outcome
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Collect => {
            info!("Starting one-time collection");
            let report = app.orchestrator().collect_all(app.connect()?).await?;

            let failed = report.failed_slices();
            info!(failed_slices = failed.len(), "Collection complete");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Refresh { subject, poll_ms } => {
            let submission = app.service.trigger_refresh(&subject, &app.credentials).await?;
            info!(job_id = %submission.status().id, "Refresh submitted");

            let status = wait_for(app, &subject, JobKind::Refresh, poll_ms).await?;
            print_status(&status)?;
            ensure_done(&status)?;

            if let CachedView::Ready { report, .. } = app.service.get_cached_result(&subject).await? {
                info!(failed_slices = ?report.failed_slices(), "Inventory cached");
            }
        }

        Commands::Billing { subject, poll_ms } => {
            let submission = app.service.trigger_billing(&subject, &app.credentials).await?;
            info!(job_id = %submission.status().id, "Billing submitted");

            let status = wait_for(app, &subject, JobKind::Billing, poll_ms).await?;
            print_status(&status)?;
            ensure_done(&status)?;
        }

        Commands::Deploy {
            subject,
            name,
            repository_url,
            region,
            instance_type,
            poll_ms,
        } => {
            let region = region
                .or_else(|| app.regions().first().cloned())
                .ok_or_else(|| eyre!("no region to deploy to"))?;
            let request = DeployRequest {
                region,
                resource_name: name,
                instance_type,
                repository_url,
            };

            let submission = app
                .service
                .trigger_deploy(&subject, &app.credentials, request)
                .await?;
            info!(job_id = %submission.status().id, "Deploy submitted");

            let status = wait_for(app, &subject, JobKind::Deploy, poll_ms).await?;
            print_status(&status)?;
            ensure_done(&status)?;
        }

        Commands::Ls { bucket } => {
            let storage = app.service.file_storage(&app.credentials).await?;
            let entries = match bucket {
                Some(bucket) => storage.file_keys(&bucket).await?,
                None => storage.bucket_names().await?,
            };
            for entry in entries {
                println!("{entry}");
            }
        }

        Commands::Get {
            bucket,
            key,
            output,
        } => {
            let storage = app.service.file_storage(&app.credentials).await?;
            let body = storage.get_file(&bucket, &key).await?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, &body).await?;
                    info!(path = %path.display(), bytes = body.len(), "Object saved");
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&body).await?;
                    stdout.flush().await?;
                }
            }
        }

        Commands::Status { subject, kind } => match app.service.get_status(&subject, kind).await? {
            Some(status) => print_status(&status)?,
            None => println!("No {kind} job for {subject}"),
        },

        Commands::Show { subject } => match app.service.get_cached_result(&subject).await? {
            CachedView::Ready { report, saved_at } => {
                let view = serde_json::json!({ "saved_at": saved_at, "report": report });
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
            CachedView::NoData => println!("No data for {subject}"),
        },

        Commands::Acknowledge { subject, kind } => {
            if app.service.acknowledge(&subject, kind).await? {
                info!(subject = %subject, kind = %kind, "Job acknowledged");
            } else {
                println!("No {kind} job for {subject}");
            }
        }
    }

    Ok(())
}

/// Poll until the job leaves `pending`; a stuck job is failed by the status read itself
async fn wait_for(app: &App, subject: &str, kind: JobKind, poll_ms: u64) -> Result<JobStatus> {
    let interval = Duration::from_millis(poll_ms.max(10));

    loop {
        let status = app
            .service
            .get_status(subject, kind)
            .await?
            .ok_or_else(|| eyre!("{kind} job for {subject} disappeared"))?;

        if status.is_pending() {
            tracing::debug!(details = %serde_json::to_string(&status.details)?, "Job still running");
            tokio::time::sleep(interval).await;
            continue;
        }

        return Ok(status);
    }
}

fn print_status(status: &JobStatus) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(status)?);
    Ok(())
}

fn ensure_done(status: &JobStatus) -> Result<()> {
    if status.state == JobState::Failed {
        bail!(
            "{} job failed: {}",
            status.kind,
            status.details.error().unwrap_or("no error recorded")
        );
    }
    Ok(())
}
