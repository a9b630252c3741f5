#![allow(dead_code)]

use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::ServerHandle;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use job_dispatch::api::{server, SchedulerService};
use job_dispatch::config::WorkerConfig;
use job_dispatch::db::MemoryJobStore;
use job_dispatch::dispatch::{builtin, ExecutionError, JobRegistry};
use job_dispatch::worker::{JobWorker, LoadGauge, WorkerError, WorkerSummary};

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A scheduler serving a fresh in-memory store on an ephemeral port
pub struct TestScheduler {
    pub address: String,
    pub store: Arc<MemoryJobStore>,
    handle: ServerHandle,
}

impl TestScheduler {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let address = listener.local_addr().expect("local addr").to_string();
        let store = Arc::new(MemoryJobStore::new());

        let server = server::run(listener, SchedulerService::new(store.clone()), 1024 * 1024)
            .expect("start scheduler");
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            address,
            store,
            handle,
        }
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

/// Builtins plus a few functions that misbehave on purpose
pub fn test_registry() -> JobRegistry {
    builtin::registry()
        .with("add_one", |args| Ok(args.get::<i64>(0)? + 1))
        .with("double", |args| Ok(args.get::<i64>(0)? * 2))
        .with("scale", |args| {
            let value: f64 = args.get(0)?;
            let factor: f64 = args.kwarg("factor")?.unwrap_or(1.0);
            Ok(value * factor)
        })
        .with("boom", |_args| -> Result<Value, ExecutionError> {
            Err(ExecutionError::raised("ValueError: boom"))
        })
        .with("explode", |_args| -> Result<Value, ExecutionError> {
            panic!("kaboom")
        })
}

/// Fast-polling worker settings for tests
pub fn worker_config(address: &str, name: &str) -> WorkerConfig {
    let mut config = WorkerConfig::new(address);
    config.worker_name = name.to_string();
    config.check_rate = Duration::from_millis(20);
    config.max_queue_size = 5;
    config.n_procs = 2;
    config
}

/// A worker loop running in the background of the test
pub struct RunningWorker {
    pub name: String,
    pub gauge: Arc<LoadGauge>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<Result<WorkerSummary, WorkerError>>,
}

impl RunningWorker {
    pub fn spawn(config: WorkerConfig) -> Self {
        let worker = JobWorker::from_config(config, test_registry()).expect("build worker");
        let name = worker.name().to_string();
        let gauge = worker.gauge();
        let (stop, stop_rx) = watch::channel(false);
        let handle = actix_web::rt::spawn(async move { worker.run(stop_rx).await });

        Self {
            name,
            gauge,
            stop,
            handle,
        }
    }

    /// Signal the worker locally and wait for it to drain
    pub async fn stop(self) -> WorkerSummary {
        let _ = self.stop.send(true);
        self.join().await
    }

    /// Wait for the worker to exit on its own, e.g. after a cluster shutdown
    pub async fn join(self) -> WorkerSummary {
        within(self.handle)
            .await
            .expect("worker task panicked")
            .expect("worker failed")
    }
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out")
}

/// Poll `condition` until it holds
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    within(async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}
