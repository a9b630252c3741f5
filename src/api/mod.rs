pub mod error;
pub mod health;
pub mod job;
pub mod server;
pub mod service;
pub mod validation;
pub mod worker;

use actix_web::web::{self, Data, ServiceConfig};

pub use error::ServiceError;
pub use service::{Assignment, SchedulerService};

/// Every scheduler route plus the extractor limits they rely on
///
/// Returns a cloneable closure so each actix worker thread can
/// `App::configure` with it.
pub fn scheduler_config(
    service: Data<SchedulerService>,
    max_payload_size: usize,
) -> impl Fn(&mut ServiceConfig) + Clone {
    move |config: &mut ServiceConfig| {
        config
            .app_data(service.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .app_data(validation::multipart_config(max_payload_size))
            .app_data(validation::json_config())
            .configure(health::health_config)
            .configure(worker::worker_config)
            .configure(job::job_config);
    }
}
