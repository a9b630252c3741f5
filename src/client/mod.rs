//! Submitting jobs and collecting their results.

mod connection;
mod error;
mod scheduler_client;
mod submit;
pub mod wait;

pub use connection::JobConnection;
pub use error::ClientError;
pub use scheduler_client::SchedulerClient;
pub use submit::{Arg, Call, Client};
pub use wait::{wait, Wait};
