use actix_web::{
    get, post,
    web::{Data, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;

use super::error::ServiceError;
use super::service::{Assignment, SchedulerService};
use crate::protocol::{
    DeregisterRequest, FetchJobRequest, RegisterRequest, SuccessResponse, JOB_ID_HEADER, NO_JOB,
    SHUTDOWN,
};

#[post("/register")]
async fn register(
    service: Data<SchedulerService>,
    request: Json<RegisterRequest>,
) -> Result<HttpResponse, ServiceError> {
    service
        .register_worker(&request.worker_name, request.max_queue_size)
        .await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

/// Drop a worker from the registry; its name may be registered again
#[post("/deregister")]
async fn deregister(
    service: Data<SchedulerService>,
    request: Json<DeregisterRequest>,
) -> Result<HttpResponse, ServiceError> {
    service.deregister_worker(&request.worker_name).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

/// Worker poll
///
/// An assigned job comes back as the raw payload with its id in the
/// `x-job-id` header; otherwise the body is the `no_job` or `shutdown`
/// sentinel as plain text.
#[post("/fetch_job")]
async fn fetch_job(
    service: Data<SchedulerService>,
    request: Json<FetchJobRequest>,
) -> Result<HttpResponse, ServiceError> {
    let response = match service.fetch_job(&request).await? {
        Assignment::Job(job) => HttpResponse::Ok()
            .insert_header((JOB_ID_HEADER, job.job_id))
            .content_type("application/octet-stream")
            .body(job.payload),
        Assignment::NoJob => HttpResponse::Ok().content_type("text/plain").body(NO_JOB),
        Assignment::Shutdown => HttpResponse::Ok().content_type("text/plain").body(SHUTDOWN),
    };
    Ok(response)
}

#[get("/worker_status")]
async fn worker_status(service: Data<SchedulerService>) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(service.worker_status().await?))
}

/// Every later `/fetch_job` answers `shutdown`
#[get("/shutdown")]
async fn shutdown(service: Data<SchedulerService>) -> Result<HttpResponse, ServiceError> {
    service.request_shutdown().await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

pub fn worker_config(config: &mut ServiceConfig) {
    config
        .service(register)
        .service(deregister)
        .service(fetch_job)
        .service(worker_status)
        .service(shutdown);
}
