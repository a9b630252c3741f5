use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::{debug, info};

use crate::db::models::{JobRow, WorkerRow};
use crate::db::{connection, migrations, JobStore, StoreError};
use crate::job::{FetchedResult, Job, JobOutcome, JobStatus, WorkerInfo};
use crate::protocol::StatusReport;

const JOB_COLUMNS: &str =
    "job_id, submitted_at, payload, status, assigned_worker, worker_state, result, exception";

const WORKER_COLUMNS: &str =
    "worker_name, current_queue_size, max_queue_size, registered_at, last_seen_at";

const SHUTDOWN_FLAG: &str = "shutdown";

/// Job store backed by PostgreSQL
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Connect, then bring the schema up to date
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = connection::get_connection(database_url, max_connections).await?;
        info!("Database connection pool established");

        migrations::run_migrations(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;

        Ok(Self::new(pool))
    }

    async fn status_of(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError> {
        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        status
            .map(|(s,)| s.parse().map_err(StoreError::Corrupt))
            .transpose()
    }
}

#[async_trait::async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job_id: &str, payload: &[u8]) -> Result<Job, StoreError> {
        debug!("Creating job: job_id={}, payload={} bytes", job_id, payload.len());

        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO jobs (job_id, payload, status)
            VALUES ($1, $2, 'queued')
            ON CONFLICT (job_id) DO NOTHING
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::DuplicateJob(job_id.to_string()))?
            .try_into()
    }

    async fn get(&self, job_id: &str) -> Result<Job, StoreError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| StoreError::NotFound(job_id.to_string()))?
            .try_into()
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY submitted_at ASC, seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn update_status_batch(&self, reports: &[StatusReport]) -> Result<u64, StoreError> {
        if reports.is_empty() {
            return Ok(0);
        }

        let (ids, states): (Vec<String>, Vec<String>) = reports
            .iter()
            .map(|r| (r.job_id.clone(), r.status.as_str().to_string()))
            .unzip();

        // One statement, so the whole batch is applied or none of it is
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET worker_state = r.state, updated_at = now()
            FROM UNNEST($1::text[], $2::text[]) AS r(job_id, state)
            WHERE jobs.job_id = r.job_id AND jobs.status = 'dispatched'
            "#,
        )
        .bind(ids)
        .bind(states)
        .execute(&self.pool)
        .await?;

        debug!(
            "Applied {} of {} worker status reports",
            result.rows_affected(),
            reports.len()
        );
        Ok(result.rows_affected())
    }

    async fn claim_next_queued(&self, worker_name: &str) -> Result<Option<Job>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET status = 'dispatched', assigned_worker = $1, updated_at = now()
            WHERE job_id = (
                SELECT job_id FROM jobs
                WHERE status = 'queued'
                ORDER BY submitted_at ASC, seq ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn submit_result(&self, job_id: &str, outcome: JobOutcome) -> Result<(), StoreError> {
        let status = outcome.status();
        let (result, exception) = match outcome {
            JobOutcome::Completed(bytes) => (Some(bytes), None),
            JobOutcome::Failed(message) => (None, Some(message)),
        };

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, result = $3, exception = $4, worker_state = NULL, updated_at = now()
            WHERE job_id = $1 AND status = 'dispatched'
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(result)
        .bind(exception)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }

        match self.status_of(job_id).await? {
            None => Err(StoreError::NotFound(job_id.to_string())),
            Some(status) => Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                status,
            }),
        }
    }

    async fn fetch_and_delete(&self, job_id: &str) -> Result<FetchedResult, StoreError> {
        let row: Option<(String, Option<Vec<u8>>, Option<String>)> = sqlx::query_as(
            r#"
            DELETE FROM jobs
            WHERE job_id = $1 AND status IN ('completed', 'failed')
            RETURNING status, result, exception
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let (status, result, exception) =
            row.ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        Ok(FetchedResult {
            status: status.parse().map_err(StoreError::Corrupt)?,
            result,
            exception,
        })
    }

    async fn register_worker(
        &self,
        worker_name: &str,
        max_queue_size: i32,
        stale_before: DateTime<Utc>,
    ) -> Result<WorkerInfo, StoreError> {
        // a live holder of the name makes the WHERE fail, so nothing is returned
        let row: Option<WorkerRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO workers (worker_name, max_queue_size)
            VALUES ($1, $2)
            ON CONFLICT (worker_name) DO UPDATE
            SET max_queue_size = EXCLUDED.max_queue_size,
                current_queue_size = 0,
                registered_at = now(),
                last_seen_at = now()
            WHERE workers.last_seen_at < $3
            RETURNING {WORKER_COLUMNS}
            "#
        ))
        .bind(worker_name)
        .bind(max_queue_size)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkerInfo::from)
            .ok_or_else(|| StoreError::DuplicateWorker(worker_name.to_string()))
    }

    async fn deregister_worker(&self, worker_name: &str) -> Result<(), StoreError> {
        let deleted = sqlx::query("DELETE FROM workers WHERE worker_name = $1")
            .bind(worker_name)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::UnknownWorker(worker_name.to_string()));
        }
        debug!("Deregistered worker {}", worker_name);
        Ok(())
    }

    async fn record_worker_load(
        &self,
        worker_name: &str,
        current_queue_size: i32,
        max_queue_size: Option<i32>,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE workers
            SET current_queue_size = $2,
                max_queue_size = COALESCE($3, max_queue_size),
                last_seen_at = now()
            WHERE worker_name = $1
            "#,
        )
        .bind(worker_name)
        .bind(current_queue_size)
        .bind(max_queue_size)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::UnknownWorker(worker_name.to_string()));
        }
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerInfo>, StoreError> {
        let rows: Vec<WorkerRow> = sqlx::query_as(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers ORDER BY registered_at ASC, worker_name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WorkerInfo::from).collect())
    }

    async fn set_shutdown(&self, requested: bool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_flags (name, enabled)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET enabled = EXCLUDED.enabled
            "#,
        )
        .bind(SHUTDOWN_FLAG)
        .bind(requested)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn shutdown_requested(&self) -> Result<bool, StoreError> {
        let flag: Option<(bool,)> =
            sqlx::query_as("SELECT enabled FROM scheduler_flags WHERE name = $1")
                .bind(SHUTDOWN_FLAG)
                .fetch_optional(&self.pool)
                .await?;

        Ok(flag.map(|(enabled,)| enabled).unwrap_or(false))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// These need a live database: `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`
#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> PgJobStore {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let store = PgJobStore::connect(&url, 5).await.expect("connect to postgres");
        sqlx::query("TRUNCATE jobs, workers, scheduler_flags")
            .execute(&store.pool)
            .await
            .expect("truncate tables");
        store
    }

    #[tokio::test]
    #[ignore]
    async fn claims_in_submission_order() {
        let store = store().await;
        store.create("first", b"1").await.unwrap();
        store.create("second", b"2").await.unwrap();

        let claimed = store.claim_next_queued("w1").await.unwrap().unwrap();
        assert_eq!(claimed.job_id, "first");
        assert_eq!(claimed.assigned_worker.as_deref(), Some("w1"));

        let claimed = store.claim_next_queued("w1").await.unwrap().unwrap();
        assert_eq!(claimed.job_id, "second");
        assert!(store.claim_next_queued("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn result_is_fetched_once() {
        let store = store().await;
        store.create("job", b"payload").await.unwrap();
        store.claim_next_queued("w1").await.unwrap();
        store
            .submit_result("job", JobOutcome::Completed(b"42".to_vec()))
            .await
            .unwrap();

        let fetched = store.fetch_and_delete("job").await.unwrap();
        assert_eq!(fetched.result.as_deref(), Some(&b"42"[..]));
        assert!(matches!(
            store.fetch_and_delete("job").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn terminal_jobs_reject_results() {
        let store = store().await;
        store.create("job", b"payload").await.unwrap();
        store.claim_next_queued("w1").await.unwrap();
        store
            .submit_result("job", JobOutcome::Failed("boom".into()))
            .await
            .unwrap();

        let err = store
            .submit_result("job", JobOutcome::Completed(b"1".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    #[ignore]
    async fn worker_names_free_up_after_deregister_or_going_stale() {
        let store = store().await;
        let long_ago = Utc::now() - chrono::Duration::hours(1);
        store.register_worker("w1", 5, long_ago).await.unwrap();
        assert!(matches!(
            store.register_worker("w1", 5, long_ago).await,
            Err(StoreError::DuplicateWorker(_))
        ));

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let worker = store.register_worker("w1", 9, cutoff).await.unwrap();
        assert_eq!(worker.max_queue_size, 9);

        store.deregister_worker("w1").await.unwrap();
        assert!(matches!(
            store.deregister_worker("w1").await,
            Err(StoreError::UnknownWorker(_))
        ));
        store.register_worker("w1", 5, long_ago).await.unwrap();
    }
}
