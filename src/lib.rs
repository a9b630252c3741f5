//! Distributed job dispatch.
//!
//! A scheduler ([`api`]) keeps a durable queue of opaque job payloads in a
//! [`db::JobStore`]. Workers ([`worker`]) poll it over HTTP, run jobs on a
//! bounded pool of named functions ([`dispatch`]) and report results once.
//! Clients ([`client`]) submit calls and get back [`client::JobConnection`]
//! handles that can be awaited or passed as arguments to later calls.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod job;
pub mod logging;
pub mod protocol;
pub mod shutdown;
pub mod worker;
