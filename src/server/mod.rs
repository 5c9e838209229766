// Local HTTP server: lifecycle, request routing and bootstrap injection.

pub mod bootstrap;
pub mod handler;
pub mod local_server;
pub mod stats;

pub use local_server::{InitOptions, LocalServer, ServerEvent, ServerState, Transition};
pub use stats::ServerStatsSnapshot;
