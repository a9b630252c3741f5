pub mod handlers;

pub use handlers::job_config;
