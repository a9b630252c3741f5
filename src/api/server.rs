use std::net::TcpListener;

use actix_web::{dev::Server, web::Data, App, HttpServer};
use tracing::info;

use super::{scheduler_config, SchedulerService};

/// Build the scheduler HTTP server on an already-bound listener
///
/// Signal handling is left to the caller (see [`crate::shutdown`]), so the
/// returned server only stops through its handle.
pub fn run(
    listener: TcpListener,
    service: SchedulerService,
    max_payload_size: usize,
) -> std::io::Result<Server> {
    let address = listener.local_addr()?;
    let routes = scheduler_config(Data::new(service), max_payload_size);

    let server = HttpServer::new(move || App::new().configure(routes.clone()))
        .disable_signals()
        .listen(listener)?
        .run();

    info!("Scheduler listening on http://{}", address);
    Ok(server)
}
