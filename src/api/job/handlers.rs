use actix_multipart::form::{bytes::Bytes, text::Text, MultipartForm};
use actix_web::{
    get, post,
    web::{Data, Path, ServiceConfig},
    HttpResponse,
};
use tracing::debug;

use crate::api::{error::ServiceError, service::SchedulerService};
use crate::protocol::{ResultPackage, SubmitJobResponse, SuccessResponse};

/// `/submit_job` upload: the serialized payload plus an optional job id
#[derive(MultipartForm)]
pub struct SubmitJobForm {
    job: Bytes,
    job_id: Option<Text<String>>,
}

/// `/submit_job_result` upload: one JSON-encoded [`ResultPackage`]
#[derive(MultipartForm)]
pub struct SubmitResultForm {
    package: Bytes,
}

#[post("/submit_job")]
async fn submit_job(
    service: Data<SchedulerService>,
    MultipartForm(form): MultipartForm<SubmitJobForm>,
) -> Result<HttpResponse, ServiceError> {
    let job_id = form.job_id.map(Text::into_inner);
    let job = service.submit_job(job_id, form.job.data.to_vec()).await?;

    Ok(HttpResponse::Ok().json(SubmitJobResponse {
        success: true,
        job_id: job.job_id,
    }))
}

#[post("/submit_job_result")]
async fn submit_job_result(
    service: Data<SchedulerService>,
    MultipartForm(form): MultipartForm<SubmitResultForm>,
) -> Result<HttpResponse, ServiceError> {
    let package: ResultPackage = serde_json::from_slice(&form.package.data)
        .map_err(|e| ServiceError::Protocol(format!("Invalid result package: {}", e)))?;
    debug!("Received result for job {}", package.job_id);

    service.submit_job_result(package).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

#[get("/job_status")]
async fn list_jobs(service: Data<SchedulerService>) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(service.list_jobs().await?))
}

#[get("/job_status/{job_id}")]
async fn job_status(
    service: Data<SchedulerService>,
    job_id: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(service.job_status(&job_id).await?))
}

/// Returns the result once and deletes the job
#[get("/get_result/{job_id}")]
async fn get_result(
    service: Data<SchedulerService>,
    job_id: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(service.get_result(&job_id).await?))
}

pub fn job_config(config: &mut ServiceConfig) {
    config
        .service(submit_job)
        .service(submit_job_result)
        .service(list_jobs)
        .service(job_status)
        .service(get_result);
}
