use std::fmt::Display;
use std::net::TcpListener;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use job_dispatch::api::{server, SchedulerService};
use job_dispatch::client::SchedulerClient;
use job_dispatch::config::{SchedulerConfig, WorkerConfig};
use job_dispatch::db::{JobStore, MemoryJobStore, PgJobStore};
use job_dispatch::dispatch::builtin;
use job_dispatch::logging;
use job_dispatch::shutdown::{self, ShutdownCoordinator};
use job_dispatch::worker::JobWorker;

#[derive(Parser)]
#[command(name = "job-dispatch", version, about = "Distributed job scheduler and workers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler HTTP service
    Scheduler {
        /// Overrides BIND_ADDRESS
        #[arg(long)]
        bind: Option<String>,
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a worker that pulls jobs from a scheduler
    Worker {
        /// Overrides SCHEDULER_ADDRESS
        #[arg(long)]
        scheduler: Option<String>,
        /// Overrides WORKER_NAME
        #[arg(long)]
        name: Option<String>,
        /// Overrides MAX_QUEUE_SIZE
        #[arg(long)]
        max_queue_size: Option<usize>,
        /// Overrides N_PROCS
        #[arg(long)]
        n_procs: Option<usize>,
        /// Overrides DISPATCH_ENDPOINT
        #[arg(long)]
        dispatch_endpoint: Option<String>,
    },
    /// Tell every worker of a scheduler to drain and exit
    Shutdown {
        #[arg(long, default_value = "127.0.0.1:4541")]
        scheduler: String,
    },
}

fn other(e: impl Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    match Cli::parse().command {
        Command::Scheduler { bind, port } => {
            let mut config = SchedulerConfig::from_env().map_err(other)?;
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_scheduler(config).await
        }
        Command::Worker {
            scheduler,
            name,
            max_queue_size,
            n_procs,
            dispatch_endpoint,
        } => {
            let mut config = WorkerConfig::from_env();
            if let Some(scheduler) = scheduler {
                config.scheduler_address = scheduler;
            }
            if let Some(name) = name {
                config.worker_name = name;
            }
            if let Some(max_queue_size) = max_queue_size {
                config.max_queue_size = max_queue_size.max(1);
            }
            if let Some(n_procs) = n_procs {
                config.n_procs = n_procs.max(1);
            }
            if dispatch_endpoint.is_some() {
                config.dispatch_endpoint = dispatch_endpoint;
            }
            run_worker(config).await
        }
        Command::Shutdown { scheduler } => {
            SchedulerClient::new(&scheduler)
                .map_err(other)?
                .shutdown()
                .await
                .map_err(other)?;
            println!("Shutdown requested on {}", scheduler);
            Ok(())
        }
    }
}

async fn run_scheduler(config: SchedulerConfig) -> std::io::Result<()> {
    logging::init(&config.log_dir)?;

    info!("Starting job-dispatch scheduler");
    info!("Configuration loaded successfully:");
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max database connections: {}", config.max_db_connections);
    info!("  - Worker timeout: {:?}", config.worker_timeout);

    let store: Arc<dyn JobStore> = if config.uses_memory_store() {
        warn!("Using the in-memory job store; jobs are lost on restart");
        Arc::new(MemoryJobStore::new())
    } else {
        let store = PgJobStore::connect(&config.database_url, config.max_db_connections)
            .await
            .map_err(other)?;
        info!("Database connection pool established and migrated");
        Arc::new(store)
    };

    // clear a flag left by a previous run
    store.set_shutdown(false).await.map_err(other)?;

    let listener = TcpListener::bind((config.bind_address.as_str(), config.port))?;
    let server = server::run(
        listener,
        SchedulerService::new(Arc::clone(&store)).with_worker_timeout(config.worker_timeout),
        config.max_payload_size,
    )?;

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::new(server_handle, server_task, store)
        .wait_for_shutdown()
        .await
}

async fn run_worker(config: WorkerConfig) -> std::io::Result<()> {
    logging::init(&config.log_dir)?;

    info!(
        "Starting worker {} against {} ({} slots, max_queue_size={})",
        config.worker_name, config.scheduler_address, config.n_procs, config.max_queue_size
    );

    let worker = JobWorker::from_config(config, builtin::registry()).map_err(other)?;
    let summary = shutdown::run_worker(&worker).await.map_err(other)?;

    if summary.unreported > 0 {
        warn!(
            "Worker {} lost {} results that never reached the scheduler",
            worker.name(),
            summary.unreported
        );
    }
    Ok(())
}
