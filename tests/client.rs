mod common;

use job_dispatch::client::{wait, Arg, Call, Client, ClientError};
use job_dispatch::job::JobStatus;
use serde_json::json;

use common::{eventually, within, worker_config, RunningWorker, TestScheduler};

#[actix_web::test]
async fn job_results_feed_later_calls() {
    let scheduler = TestScheduler::start();
    let worker = RunningWorker::spawn(worker_config(&scheduler.address, "w1"));
    let client = Client::new(&scheduler.address).unwrap();

    let first = client.submit(Call::new("add_one").arg(3)).await.unwrap();
    // submitted only once `first` has resolved
    let second = within(client.submit(Call::new("double").arg(&first)))
        .await
        .unwrap();

    assert_eq!(within(wait(&second)).await.unwrap(), json!(8));
    assert_eq!(first.result().await.unwrap(), json!(4));

    worker.stop().await;
    scheduler.stop().await;
}

#[actix_web::test]
async fn keyword_arguments_resolve_too() {
    let scheduler = TestScheduler::start();
    let worker = RunningWorker::spawn(worker_config(&scheduler.address, "w1"));
    let client = Client::new(&scheduler.address).unwrap();

    let factor = client.submit(Call::new("add_one").arg(1)).await.unwrap();
    let scaled = within(
        client.submit(Call::new("scale").arg(1.5).kwarg("factor", &factor)),
    )
    .await
    .unwrap();

    assert_eq!(within(wait(&scaled)).await.unwrap(), json!(3.0));

    worker.stop().await;
    scheduler.stop().await;
}

#[actix_web::test]
async fn wait_handles_lists_and_mixed_arguments() {
    let scheduler = TestScheduler::start();
    let worker = RunningWorker::spawn(worker_config(&scheduler.address, "w1"));
    let client = Client::new(&scheduler.address).unwrap();

    let jobs = client.map("add_one", 0i64..5).await.unwrap();
    let results = within(wait(&jobs[..])).await.unwrap();
    assert_eq!(results, (1..=5).map(|n| json!(n)).collect::<Vec<_>>());

    let job = client.submit(Call::new("double").arg(5)).await.unwrap();
    let mixed = within(wait(vec![Arg::from(&job), Arg::from("plain"), Arg::from(7)]))
        .await
        .unwrap();
    assert_eq!(mixed, vec![json!(10), json!("plain"), json!(7)]);

    worker.stop().await;
    scheduler.stop().await;
}

#[actix_web::test]
async fn results_are_fetched_once_and_cached() {
    let scheduler = TestScheduler::start();
    let worker = RunningWorker::spawn(worker_config(&scheduler.address, "w1"));
    let client = Client::new(&scheduler.address).unwrap();

    let job = client.submit(Call::new("add_one").arg(10)).await.unwrap();
    assert_eq!(within(wait(&job)).await.unwrap(), json!(11));

    // the record is gone from the scheduler, the handle still answers
    assert_eq!(job.result().await.unwrap(), json!(11));
    assert_eq!(job.status().await.unwrap(), JobStatus::Completed);
    assert_eq!(job.exception().await.unwrap(), None);

    let clone = job.clone();
    assert_eq!(clone.result().await.unwrap(), json!(11));

    let stranger = client.connect(job.job_id());
    assert!(matches!(
        stranger.result().await,
        Err(ClientError::NotFound(_))
    ));

    worker.stop().await;
    scheduler.stop().await;
}

#[actix_web::test]
async fn a_failed_job_in_a_list_keeps_its_siblings_results() {
    let scheduler = TestScheduler::start();
    let worker = RunningWorker::spawn(worker_config(&scheduler.address, "w1"));
    let client = Client::new(&scheduler.address).unwrap();

    let failing = client.submit(Call::new("boom")).await.unwrap();
    let healthy = client.submit(Call::new("add_one").arg(41)).await.unwrap();
    let (first, second) = (&failing, &healthy);
    eventually(move || async move {
        first.is_done().await.unwrap() && second.is_done().await.unwrap()
    })
    .await;

    let jobs = vec![failing.clone(), healthy.clone()];
    let err = within(wait(&jobs[..])).await.unwrap_err();
    assert!(matches!(err, ClientError::JobFailed { ref job_id, .. } if job_id == failing.job_id()));

    // both records are gone from the scheduler, yet nothing was lost
    assert_eq!(healthy.result().await.unwrap(), json!(42));
    assert!(failing.exception().await.unwrap().is_some());
    assert!(client.scheduler().list_jobs().await.unwrap().is_empty());

    worker.stop().await;
    scheduler.stop().await;
}

#[actix_web::test]
async fn unfinished_jobs_have_no_result_yet() {
    let scheduler = TestScheduler::start();
    let client = Client::new(&scheduler.address).unwrap();

    let job = client.submit(Call::new("add_one").arg(1)).await.unwrap();
    assert_eq!(job.status().await.unwrap(), JobStatus::Queued);
    assert!(!job.is_done().await.unwrap());
    assert!(matches!(
        job.result().await,
        Err(ClientError::NotFinished(_))
    ));

    // a worker arriving later still picks it up
    let worker = RunningWorker::spawn(worker_config(&scheduler.address, "late"));
    assert_eq!(within(wait(&job)).await.unwrap(), json!(2));

    worker.stop().await;
    scheduler.stop().await;
}
