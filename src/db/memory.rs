use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::{JobStore, StoreError};
use crate::job::{FetchedResult, Job, JobOutcome, JobStatus, WorkerInfo};
use crate::protocol::StatusReport;

/// Job store kept in process memory
///
/// Holds the same guarantees as [`super::PgJobStore`] by serializing every
/// operation behind one lock, but nothing survives a restart. Used by tests
/// and by `DATABASE_URL=memory://`.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<String, Entry>,
    next_seq: u64,
    workers: BTreeMap<String, WorkerInfo>,
    shutdown: bool,
}

struct Entry {
    seq: u64,
    job: Job,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job_id: &str, payload: &[u8]) -> Result<Job, StoreError> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(job_id) {
            return Err(StoreError::DuplicateJob(job_id.to_string()));
        }

        let job = Job {
            job_id: job_id.to_string(),
            submitted_at: Utc::now(),
            payload: payload.to_vec(),
            status: JobStatus::Queued,
            assigned_worker: None,
            worker_state: None,
            result: None,
            exception: None,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.jobs.insert(
            job_id.to_string(),
            Entry {
                seq,
                job: job.clone(),
            },
        );
        Ok(job)
    }

    async fn get(&self, job_id: &str) -> Result<Job, StoreError> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(job_id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<&Entry> = state.jobs.values().collect();
        entries.sort_by_key(|entry| (entry.job.submitted_at, entry.seq));
        Ok(entries.into_iter().map(|entry| entry.job.clone()).collect())
    }

    async fn update_status_batch(&self, reports: &[StatusReport]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for report in reports {
            if let Some(entry) = state.jobs.get_mut(&report.job_id) {
                if entry.job.status == JobStatus::Dispatched {
                    entry.job.worker_state = Some(report.status);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn claim_next_queued(&self, worker_name: &str) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.lock().await;
        let next = state
            .jobs
            .values_mut()
            .filter(|entry| entry.job.status == JobStatus::Queued)
            .min_by_key(|entry| (entry.job.submitted_at, entry.seq));

        Ok(next.map(|entry| {
            entry.job.status = JobStatus::Dispatched;
            entry.job.assigned_worker = Some(worker_name.to_string());
            entry.job.clone()
        }))
    }

    async fn submit_result(&self, job_id: &str, outcome: JobOutcome) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let entry = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        if entry.job.status != JobStatus::Dispatched {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                status: entry.job.status,
            });
        }

        entry.job.status = outcome.status();
        entry.job.worker_state = None;
        match outcome {
            JobOutcome::Completed(bytes) => entry.job.result = Some(bytes),
            JobOutcome::Failed(message) => entry.job.exception = Some(message),
        }
        Ok(())
    }

    async fn fetch_and_delete(&self, job_id: &str) -> Result<FetchedResult, StoreError> {
        let mut state = self.state.lock().await;
        let terminal = state
            .jobs
            .get(job_id)
            .map(|entry| entry.job.status.is_terminal())
            .unwrap_or(false);
        if !terminal {
            return Err(StoreError::NotFound(job_id.to_string()));
        }

        let job = state
            .jobs
            .remove(job_id)
            .map(|entry| entry.job)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        Ok(FetchedResult {
            status: job.status,
            result: job.result,
            exception: job.exception,
        })
    }

    async fn register_worker(
        &self,
        worker_name: &str,
        max_queue_size: i32,
        stale_before: DateTime<Utc>,
    ) -> Result<WorkerInfo, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.workers.get(worker_name) {
            if existing.last_seen_at >= stale_before {
                return Err(StoreError::DuplicateWorker(worker_name.to_string()));
            }
        }

        let now = Utc::now();
        let worker = WorkerInfo {
            worker_name: worker_name.to_string(),
            current_queue_size: 0,
            max_queue_size,
            registered_at: now,
            last_seen_at: now,
        };
        state
            .workers
            .insert(worker_name.to_string(), worker.clone());
        Ok(worker)
    }

    async fn deregister_worker(&self, worker_name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .workers
            .remove(worker_name)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownWorker(worker_name.to_string()))
    }

    async fn record_worker_load(
        &self,
        worker_name: &str,
        current_queue_size: i32,
        max_queue_size: Option<i32>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let worker = state
            .workers
            .get_mut(worker_name)
            .ok_or_else(|| StoreError::UnknownWorker(worker_name.to_string()))?;

        worker.current_queue_size = current_queue_size;
        if let Some(max) = max_queue_size {
            worker.max_queue_size = max;
        }
        worker.last_seen_at = Utc::now();
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerInfo>, StoreError> {
        let state = self.state.lock().await;
        let mut workers: Vec<WorkerInfo> = state.workers.values().cloned().collect();
        workers.sort_by(|a, b| {
            (a.registered_at, &a.worker_name).cmp(&(b.registered_at, &b.worker_name))
        });
        Ok(workers)
    }

    async fn set_shutdown(&self, requested: bool) -> Result<(), StoreError> {
        self.state.lock().await.shutdown = requested;
        Ok(())
    }

    async fn shutdown_requested(&self) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.shutdown)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::LocalState;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn duplicate_job_id_is_rejected() {
        let store = MemoryJobStore::new();
        store.create("job-1", b"a").await.unwrap();

        let err = store.create("job-1", b"b").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateJob(id) if id == "job-1"));
    }

    #[tokio::test]
    async fn get_unknown_job_is_not_found() {
        let store = MemoryJobStore::new();
        assert!(matches!(
            store.get("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn claims_oldest_queued_job_first() {
        let store = MemoryJobStore::new();
        for i in 0..20 {
            store.create(&format!("job-{:02}", i), b"x").await.unwrap();
        }

        let mut previous = None;
        while let Some(job) = store.claim_next_queued("w1").await.unwrap() {
            assert_eq!(job.status, JobStatus::Dispatched);
            if let Some(prev) = previous {
                assert!(job.submitted_at >= prev);
            }
            // nothing older may still be queued
            let queued_older = store
                .list()
                .await
                .unwrap()
                .into_iter()
                .filter(|j| j.status == JobStatus::Queued)
                .any(|j| j.submitted_at < job.submitted_at);
            assert!(!queued_older);
            previous = Some(job.submitted_at);
        }
    }

    #[tokio::test]
    async fn listing_is_in_submission_order() {
        let store = MemoryJobStore::new();
        for id in ["c", "a", "b"] {
            store.create(id, b"x").await.unwrap();
        }

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_job() {
        let store = Arc::new(MemoryJobStore::new());
        for i in 0..60 {
            store.create(&format!("job-{}", i), b"x").await.unwrap();
        }

        let mut tasks = Vec::new();
        for w in 0..6 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = store.claim_next_queued(&format!("w{}", w)).await.unwrap() {
                    claimed.push(job.job_id);
                    tokio::task::yield_now().await;
                }
                claimed
            }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            for id in task.await.unwrap() {
                assert!(seen.insert(id), "job claimed twice");
            }
        }
        assert_eq!(seen.len(), 60);
    }

    #[tokio::test]
    async fn status_reports_only_touch_dispatched_jobs() {
        let store = MemoryJobStore::new();
        store.create("first", b"x").await.unwrap();
        store.create("second", b"x").await.unwrap();
        store.claim_next_queued("w1").await.unwrap();
        store
            .submit_result("first", JobOutcome::Completed(b"1".to_vec()))
            .await
            .unwrap();
        store.claim_next_queued("w1").await.unwrap();

        let reports = vec![
            StatusReport {
                job_id: "first".into(),
                status: LocalState::Running,
            },
            StatusReport {
                job_id: "second".into(),
                status: LocalState::Running,
            },
            StatusReport {
                job_id: "ghost".into(),
                status: LocalState::Pending,
            },
        ];
        assert_eq!(store.update_status_batch(&reports).await.unwrap(), 1);

        let completed = store.get("first").await.unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.worker_state, None);
        assert_eq!(
            store.get("second").await.unwrap().worker_state,
            Some(LocalState::Running)
        );
    }

    #[tokio::test]
    async fn terminal_state_is_immutable() {
        let store = MemoryJobStore::new();
        store.create("job", b"x").await.unwrap();

        let err = store
            .submit_result("job", JobOutcome::Completed(b"1".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                status: JobStatus::Queued,
                ..
            }
        ));

        store.claim_next_queued("w1").await.unwrap();
        store
            .submit_result("job", JobOutcome::Failed("boom".into()))
            .await
            .unwrap();
        let err = store
            .submit_result("job", JobOutcome::Completed(b"1".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                status: JobStatus::Failed,
                ..
            }
        ));
        assert_eq!(
            store.get("job").await.unwrap().exception.as_deref(),
            Some("boom")
        );
    }

    #[tokio::test]
    async fn fetch_and_delete_succeeds_exactly_once() {
        let store = MemoryJobStore::new();
        store.create("job", b"x").await.unwrap();

        // not yet terminal
        assert!(matches!(
            store.fetch_and_delete("job").await,
            Err(StoreError::NotFound(_))
        ));

        store.claim_next_queued("w1").await.unwrap();
        store
            .submit_result("job", JobOutcome::Completed(b"8".to_vec()))
            .await
            .unwrap();

        let fetched = store.fetch_and_delete("job").await.unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.result, Some(b"8".to_vec()));
        assert_eq!(fetched.exception, None);

        assert!(matches!(
            store.fetch_and_delete("job").await,
            Err(StoreError::NotFound(_))
        ));
    }

    fn long_ago() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn duplicate_worker_registration_is_rejected() {
        let store = MemoryJobStore::new();
        store.register_worker("w1", 5, long_ago()).await.unwrap();

        assert!(matches!(
            store.register_worker("w1", 5, long_ago()).await,
            Err(StoreError::DuplicateWorker(_))
        ));
    }

    #[tokio::test]
    async fn stale_worker_name_can_be_taken_over() {
        let store = MemoryJobStore::new();
        store.register_worker("w1", 5, long_ago()).await.unwrap();
        store.record_worker_load("w1", 4, None).await.unwrap();

        // everything seen before now counts as stale
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let worker = store.register_worker("w1", 7, cutoff).await.unwrap();
        assert_eq!(worker.current_queue_size, 0);
        assert_eq!(worker.max_queue_size, 7);
        assert_eq!(store.list_workers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deregistered_name_is_free_again() {
        let store = MemoryJobStore::new();
        store.register_worker("w1", 5, long_ago()).await.unwrap();
        store.deregister_worker("w1").await.unwrap();

        assert!(store.list_workers().await.unwrap().is_empty());
        assert!(matches!(
            store.deregister_worker("w1").await,
            Err(StoreError::UnknownWorker(_))
        ));
        store.register_worker("w1", 5, long_ago()).await.unwrap();
    }

    #[tokio::test]
    async fn worker_load_requires_registration() {
        let store = MemoryJobStore::new();
        assert!(matches!(
            store.record_worker_load("w1", 1, None).await,
            Err(StoreError::UnknownWorker(_))
        ));

        store.register_worker("w1", 5, long_ago()).await.unwrap();
        store.record_worker_load("w1", 3, Some(8)).await.unwrap();

        let workers = store.list_workers().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].current_queue_size, 3);
        assert_eq!(workers[0].max_queue_size, 8);
    }
}
