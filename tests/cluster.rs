mod common;

use std::collections::HashSet;

use futures_util::future::join_all;
use job_dispatch::client::{wait, Client, ClientError, SchedulerClient};
use job_dispatch::db::JobStore;
use job_dispatch::job::JobStatus;
use serde_json::json;

use common::{eventually, within, worker_config, RunningWorker, TestScheduler};

#[actix_web::test]
async fn many_workers_complete_every_job_once() {
    let scheduler = TestScheduler::start();
    let workers: Vec<RunningWorker> = (0..3)
        .map(|i| RunningWorker::spawn(worker_config(&scheduler.address, &format!("node-{}", i))))
        .collect();
    let client = Client::new(&scheduler.address).unwrap();

    let jobs = client.map("add_one", 0i64..50).await.unwrap();
    let ids: HashSet<&str> = jobs.iter().map(|job| job.job_id()).collect();
    assert_eq!(ids.len(), 50);

    let store = &scheduler.store;
    eventually(move || async move {
        store
            .list()
            .await
            .unwrap()
            .iter()
            .all(|job| job.status == JobStatus::Completed)
    })
    .await;

    let scheduler_client = SchedulerClient::new(&scheduler.address).unwrap();
    let listing = scheduler_client.list_jobs().await.unwrap();
    assert_eq!(listing.len(), 50);
    assert!(listing.iter().all(|job| job.status == JobStatus::Completed));
    assert_eq!(scheduler_client.worker_status().await.unwrap().len(), 3);

    let results = within(wait(&jobs[..])).await.unwrap();
    assert_eq!(results, (1..=50).map(|n| json!(n)).collect::<Vec<_>>());

    for job in &jobs {
        assert!(matches!(
            scheduler_client.get_result(job.job_id()).await,
            Err(ClientError::NotFound(_))
        ));
    }

    let summaries = join_all(workers.into_iter().map(RunningWorker::stop)).await;
    let completed: usize = summaries.iter().map(|s| s.completed).sum();
    let failed: usize = summaries.iter().map(|s| s.failed).sum();
    assert_eq!(completed, 50);
    assert_eq!(failed, 0);
    assert!(summaries.iter().all(|s| s.unreported == 0));

    // every result was collected, so nothing is left behind
    assert!(scheduler.store.list().await.unwrap().is_empty());
    scheduler.stop().await;
}
