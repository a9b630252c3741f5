use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use tracing::error;

use super::service::SchedulerService;
use crate::protocol::SuccessResponse;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Liveness check endpoint
///
/// Answers as long as the process serves requests. Workers and clients use
/// it to find out whether a scheduler is up. Does not check dependencies.
#[get("/ping")]
async fn ping() -> impl Responder {
    HttpResponse::Ok().json(SuccessResponse::ok())
}

/// Health check endpoint
///
/// Includes job store connectivity. Use for load balancers and uptime monitors.
#[get("/health")]
async fn health_check(service: web::Data<SchedulerService>) -> impl Responder {
    match service.health().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "healthy".to_string(),
            store: "connected".to_string(),
            error: None,
        }),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "unhealthy".to_string(),
                store: "disconnected".to_string(),
                error: Some(e.to_string()),
            })
        }
    }
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config.service(ping).service(health_check);
}
