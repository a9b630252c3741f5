use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use tracing::debug;

use super::ClientError;
use crate::api::validation::ErrorResponse;
use crate::job::WorkerInfo;
use crate::protocol::{
    DeregisterRequest, FetchJobRequest, FetchReply, JobStatusView, RegisterRequest,
    ResultPackage, ResultReply, SubmitJobResponse, SuccessResponse, JOB_FIELD, JOB_ID_FIELD,
    JOB_ID_HEADER, NO_JOB, PACKAGE_FIELD, SHUTDOWN,
};

/// HTTP client for every scheduler endpoint
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    http: reqwest::Client,
    base_url: String,
}

impl SchedulerClient {
    /// `address` is `host:port` or a full `http://` URL
    pub fn new(address: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let address = address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn ping(&self) -> Result<bool, ClientError> {
        let response = check(self.http.get(self.url("/ping")).send().await?).await?;
        let body: SuccessResponse = response.json().await?;
        Ok(body.success)
    }

    pub async fn register(
        &self,
        worker_name: &str,
        max_queue_size: Option<i32>,
    ) -> Result<(), ClientError> {
        let request = RegisterRequest {
            worker_name: worker_name.to_string(),
            max_queue_size,
        };
        check(self.http.post(self.url("/register")).json(&request).send().await?).await?;
        Ok(())
    }

    pub async fn deregister(&self, worker_name: &str) -> Result<(), ClientError> {
        let request = DeregisterRequest {
            worker_name: worker_name.to_string(),
        };
        check(self.http.post(self.url("/deregister")).json(&request).send().await?).await?;
        Ok(())
    }

    /// Enqueue a serialized payload; returns the id the scheduler stored it under
    pub async fn submit_job(
        &self,
        job_id: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<String, ClientError> {
        let part = Part::bytes(payload)
            .file_name(JOB_FIELD)
            .mime_str("application/octet-stream")?;
        let mut form = Form::new().part(JOB_FIELD, part);
        if let Some(job_id) = job_id {
            form = form.part(
                JOB_ID_FIELD,
                Part::text(job_id.to_string()).mime_str("text/plain")?,
            );
        }

        let response =
            check(self.http.post(self.url("/submit_job")).multipart(form).send().await?).await?;
        let body: SubmitJobResponse = response.json().await?;
        debug!("Submitted job {}", body.job_id);
        Ok(body.job_id)
    }

    pub async fn fetch_job(&self, request: &FetchJobRequest) -> Result<FetchReply, ClientError> {
        let response =
            check(self.http.post(self.url("/fetch_job")).json(request).send().await?).await?;

        let job_id = response
            .headers()
            .get(JOB_ID_HEADER)
            .map(|value| {
                value
                    .to_str()
                    .map(str::to_string)
                    .map_err(|e| ClientError::Protocol(format!("invalid job id header: {}", e)))
            })
            .transpose()?;
        let body = response.bytes().await?;

        match job_id {
            Some(job_id) => Ok(FetchReply::Job {
                job_id,
                payload: body.to_vec(),
            }),
            None if body.as_ref() == NO_JOB.as_bytes() => Ok(FetchReply::NoJob),
            None if body.as_ref() == SHUTDOWN.as_bytes() => Ok(FetchReply::Shutdown),
            None => Err(ClientError::Protocol(format!(
                "unexpected fetch_job reply: {}",
                String::from_utf8_lossy(&body)
            ))),
        }
    }

    pub async fn submit_job_result(&self, package: &ResultPackage) -> Result<(), ClientError> {
        let part = Part::bytes(serde_json::to_vec(package)?)
            .file_name(PACKAGE_FIELD)
            .mime_str("application/json")?;
        let form = Form::new().part(PACKAGE_FIELD, part);

        check(
            self.http
                .post(self.url("/submit_job_result"))
                .multipart(form)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusView, ClientError> {
        let response = check(
            self.http
                .get(self.url(&format!("/job_status/{}", job_id)))
                .send()
                .await?,
        )
        .await?;
        Ok(response.json().await?)
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobStatusView>, ClientError> {
        let response = check(self.http.get(self.url("/job_status")).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn worker_status(&self) -> Result<Vec<WorkerInfo>, ClientError> {
        let response = check(self.http.get(self.url("/worker_status")).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Fetch a terminal job's result. The scheduler deletes the job once
    /// this succeeds, so it can be called successfully only once per job.
    pub async fn get_result(&self, job_id: &str) -> Result<ResultReply, ClientError> {
        let response = check(
            self.http
                .get(self.url(&format!("/get_result/{}", job_id)))
                .send()
                .await?,
        )
        .await?;
        Ok(response.json().await?)
    }

    /// Ask every worker polling this scheduler to drain and exit
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        check(self.http.get(self.url("/shutdown")).send().await?).await?;
        Ok(())
    }
}

/// Turn non-success replies into typed errors
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .and_then(|e| {
            e.fields
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .or(Some(e.error))
        })
        .unwrap_or(body);

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        _ => ClientError::Scheduler {
            status: status.as_u16(),
            message,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_gets_http_scheme() {
        let client = SchedulerClient::new("localhost:4541/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:4541");

        let client = SchedulerClient::new("https://scheduler.internal").unwrap();
        assert_eq!(client.base_url(), "https://scheduler.internal");
    }
}
