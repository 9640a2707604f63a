pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::http_client::{AggregatePoller, PingClient, PingRequest, StreamPoller};
pub use adapters::http_server::{router, PingServer};
pub use config::AppConfig;
pub use core::scheduler::Scheduler;
pub use utils::error::{PingError, Result};
