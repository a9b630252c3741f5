use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::gauge::{Load, LoadGauge};
use crate::client::{ClientError, SchedulerClient};
use crate::config::WorkerConfig;
use crate::dispatch::{
    DispatchBackend, JobPayload, JobRegistry, LocalPool, Outcome, RemoteBackend, SlotState,
};
use crate::job::LocalState;
use crate::protocol::{FetchJobRequest, FetchReply, ResultPackage, StatusReport};

/// Attempts at delivering leftover results after the loop has stopped
const DRAIN_REPORT_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to register worker {name}: {source}")]
    Register {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to set up dispatch backend: {0}")]
    Backend(#[from] reqwest::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// What a worker did before it exited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub failed: usize,
    /// Results that could not be delivered before exit
    pub unreported: usize,
}

/// A fetched job that has not finished yet
struct InFlight {
    job_id: String,
    slot: SlotState,
    handle: JoinHandle<Outcome>,
}

/// Pulls jobs from the scheduler and runs them on a dispatch backend
pub struct JobWorker {
    config: WorkerConfig,
    scheduler: SchedulerClient,
    backend: Arc<dyn DispatchBackend>,
    gauge: Arc<LoadGauge>,
}

impl JobWorker {
    pub fn new(
        config: WorkerConfig,
        scheduler: SchedulerClient,
        backend: Arc<dyn DispatchBackend>,
    ) -> Self {
        Self {
            config,
            scheduler,
            backend,
            gauge: Arc::new(LoadGauge::default()),
        }
    }

    /// Build a worker from its config: a [`RemoteBackend`] when a dispatch
    /// endpoint is configured, otherwise a [`LocalPool`] of `n_procs` slots
    /// running functions from `registry`
    pub fn from_config(config: WorkerConfig, registry: JobRegistry) -> Result<Self, WorkerError> {
        let scheduler = SchedulerClient::new(&config.scheduler_address)?;
        let backend: Arc<dyn DispatchBackend> = match &config.dispatch_endpoint {
            Some(endpoint) => Arc::new(RemoteBackend::new(endpoint.clone(), config.n_procs)?),
            None => Arc::new(LocalPool::new(registry, config.n_procs)),
        };
        Ok(Self::new(config, scheduler, backend))
    }

    pub fn name(&self) -> &str {
        &self.config.worker_name
    }

    /// Live view of this worker's pending/running/completed counts
    pub fn gauge(&self) -> Arc<LoadGauge> {
        Arc::clone(&self.gauge)
    }

    /// Register with the scheduler, then work until told to stop
    ///
    /// # Loop
    /// 1. Collect finished jobs and report their results
    /// 2. While `pending >= max_queue_size`, sleep `check_rate` (backpressure)
    /// 3. Otherwise call `fetch_job`, carrying the state of every in-flight job
    /// 4. Start the returned job, or sleep on `no_job`, or stop on `shutdown`
    ///
    /// A failed round-trip is logged and retried after `check_rate`; it never
    /// ends the loop. A poll the scheduler answers with 404 means it no
    /// longer knows this worker, so the worker registers again. The loop
    /// also stops when `shutdown_rx` turns `true`.
    ///
    /// # Shutdown
    /// No new jobs are fetched. Jobs already running are awaited and their
    /// results reported, then the worker deregisters so its name is free.
    pub async fn run(
        &self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<WorkerSummary, WorkerError> {
        let name = self.config.worker_name.clone();
        self.register()
            .await
            .map_err(|source| WorkerError::Register {
                name: name.clone(),
                source,
            })?;
        info!(
            "Worker {} registered with {} (max_queue_size={}, check_rate={:?})",
            name,
            self.scheduler.base_url(),
            self.config.max_queue_size,
            self.config.check_rate
        );

        let mut in_flight: Vec<InFlight> = Vec::new();
        let mut outbox: Vec<ResultPackage> = Vec::new();
        let mut summary = WorkerSummary::default();

        loop {
            if *shutdown_rx.borrow() {
                info!("Worker {} received local shutdown signal", name);
                break;
            }

            self.collect_finished(&mut in_flight, &mut outbox, &mut summary)
                .await;
            self.report(&mut outbox).await;

            let load = self.observe(&in_flight, &summary);
            debug!(
                "Worker {}: pending={} running={} completed={}",
                name, load.pending, load.running, load.completed
            );

            if load.pending >= self.config.max_queue_size {
                debug!("Worker {} saturated, waiting for a free slot", name);
                self.pause(&mut shutdown_rx).await;
                continue;
            }

            let request = self.poll_request(&in_flight);
            match self.scheduler.fetch_job(&request).await {
                Ok(FetchReply::Job { job_id, payload }) => {
                    self.start(job_id, &payload, &mut in_flight, &mut outbox);
                    self.observe(&in_flight, &summary);
                }
                Ok(FetchReply::NoJob) => self.pause(&mut shutdown_rx).await,
                Ok(FetchReply::Shutdown) => {
                    info!("Worker {} received shutdown from scheduler", name);
                    break;
                }
                Err(ClientError::NotFound(message)) => {
                    warn!(
                        "Worker {} unknown to the scheduler ({}), registering again",
                        name, message
                    );
                    if let Err(e) = self.register().await {
                        warn!("Worker {} failed to register again: {}", name, e);
                        self.pause(&mut shutdown_rx).await;
                    }
                }
                Err(e) => {
                    warn!("Worker {} failed to fetch work: {}", name, e);
                    self.pause(&mut shutdown_rx).await;
                }
            }
        }

        self.drain(in_flight, outbox, summary).await
    }

    async fn register(&self) -> Result<(), ClientError> {
        self.scheduler
            .register(self.name(), Some(self.max_queue_size()))
            .await
    }

    async fn deregister(&self) {
        match self.scheduler.deregister(self.name()).await {
            Ok(()) => debug!("Worker {} deregistered", self.name()),
            Err(ClientError::NotFound(_)) => {
                debug!("Worker {} was already gone from the scheduler", self.name())
            }
            Err(e) => warn!("Worker {} failed to deregister: {}", self.name(), e),
        }
    }

    fn max_queue_size(&self) -> i32 {
        i32::try_from(self.config.max_queue_size).unwrap_or(i32::MAX)
    }

    fn poll_request(&self, in_flight: &[InFlight]) -> FetchJobRequest {
        FetchJobRequest {
            worker_name: self.config.worker_name.clone(),
            job_statuses: in_flight
                .iter()
                .map(|task| StatusReport {
                    job_id: task.job_id.clone(),
                    status: task.slot.local_state(),
                })
                .collect(),
            current_queue_size: i32::try_from(in_flight.len()).unwrap_or(i32::MAX),
            max_queue_size: Some(self.max_queue_size()),
        }
    }

    fn observe(&self, in_flight: &[InFlight], summary: &WorkerSummary) -> Load {
        let mut load = Load {
            completed: summary.completed + summary.failed,
            ..Load::default()
        };
        for task in in_flight {
            match task.slot.local_state() {
                LocalState::Pending => load.pending += 1,
                LocalState::Running => load.running += 1,
            }
        }
        self.gauge.record(load);
        load
    }

    fn start(
        &self,
        job_id: String,
        payload: &[u8],
        in_flight: &mut Vec<InFlight>,
        outbox: &mut Vec<ResultPackage>,
    ) {
        let payload = match JobPayload::from_bytes(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Job {} has a malformed payload: {}", job_id, e);
                outbox.push(ResultPackage::failed(
                    job_id,
                    format!("malformed job payload: {}", e),
                ));
                return;
            }
        };

        info!("Worker {} accepted job {} ({})", self.name(), job_id, payload.function);
        let slot = SlotState::new();
        let backend = Arc::clone(&self.backend);
        let task_slot = slot.clone();
        let handle = tokio::spawn(async move { backend.dispatch(payload, task_slot).await });

        in_flight.push(InFlight {
            job_id,
            slot,
            handle,
        });
    }

    /// Move finished jobs from `in_flight` into `outbox`
    async fn collect_finished(
        &self,
        in_flight: &mut Vec<InFlight>,
        outbox: &mut Vec<ResultPackage>,
        summary: &mut WorkerSummary,
    ) {
        let (finished, running): (Vec<InFlight>, Vec<InFlight>) = std::mem::take(in_flight)
            .into_iter()
            .partition(|task| task.handle.is_finished());
        *in_flight = running;

        for task in finished {
            outbox.push(finish(task, summary).await);
        }
    }

    /// Deliver results; anything that fails in transport stays queued
    async fn report(&self, outbox: &mut Vec<ResultPackage>) {
        let mut retry = Vec::new();
        for package in outbox.drain(..) {
            match self.scheduler.submit_job_result(&package).await {
                Ok(()) => debug!("Reported job {} as {}", package.job_id, package.status),
                Err(ClientError::Conflict(message)) => {
                    // already terminal on the scheduler, i.e. delivered earlier
                    debug!("Result for job {} already recorded: {}", package.job_id, message);
                }
                Err(ClientError::NotFound(message)) => {
                    warn!("Dropping result for job {}: {}", package.job_id, message);
                }
                Err(e) => {
                    warn!("Failed to report job {}, will retry: {}", package.job_id, e);
                    retry.push(package);
                }
            }
        }
        *outbox = retry;
    }

    async fn pause(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = sleep(self.config.check_rate) => {}
            changed = shutdown_rx.changed() => {
                // sender gone: nobody can signal us any more, keep the normal cadence
                if changed.is_err() {
                    sleep(self.config.check_rate).await;
                }
            }
        }
    }

    async fn drain(
        &self,
        in_flight: Vec<InFlight>,
        mut outbox: Vec<ResultPackage>,
        mut summary: WorkerSummary,
    ) -> Result<WorkerSummary, WorkerError> {
        info!(
            "Worker {} draining {} in-flight jobs",
            self.name(),
            in_flight.len()
        );
        for task in in_flight {
            outbox.push(finish(task, &mut summary).await);
        }

        for attempt in 1..=DRAIN_REPORT_ATTEMPTS {
            self.report(&mut outbox).await;
            if outbox.is_empty() {
                break;
            }
            if attempt < DRAIN_REPORT_ATTEMPTS {
                sleep(self.config.check_rate).await;
            }
        }

        summary.unreported = outbox.len();
        if summary.unreported > 0 {
            error!(
                "Worker {} exiting with {} unreported results",
                self.name(),
                summary.unreported
            );
        }

        self.deregister().await;

        self.observe(&[], &summary);
        info!(
            "Worker {} stopped: {} completed, {} failed",
            self.name(),
            summary.completed,
            summary.failed
        );
        Ok(summary)
    }
}

async fn finish(task: InFlight, summary: &mut WorkerSummary) -> ResultPackage {
    let outcome = match task.handle.await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::Failed(format!("job task aborted: {}", e)),
    };

    if outcome.is_completed() {
        summary.completed += 1;
    } else {
        summary.failed += 1;
    }
    outcome.into_package(task.job_id)
}
