//! Hot-swap content serving core.
//!
//! A [`LocalServer`] serves one versioned [`AssetBundle`] over HTTP on a
//! loopback port and can replace it in place; the [`UpdateOrchestrator`]
//! decides which version directory is live and where a reset rolls back to.

pub mod api;
pub mod bundle;
pub mod config;
pub mod engine;
pub mod error;
pub mod server;

pub use bundle::{AssetBundle, ResolvedAsset};
pub use config::ServerConfig;
pub use engine::UpdateOrchestrator;
pub use error::{BundleLoadError, LoadFailure, OrchestratorError, ServerError};
pub use server::{InitOptions, LocalServer, ServerEvent, ServerState, Transition};
