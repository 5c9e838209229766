use serde::Deserialize;
use serde_json::{Map, Value};

/// Upper bound on the number of bundles in a parent chain, including the head.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// Marker in the entry document that the runtime configuration script replaces.
pub const RUNTIME_CONFIG_PLACEHOLDER: &str = "<!-- runtime-config -->";

/// Global the bootstrap script assigns the decoded runtime configuration to.
pub const RUNTIME_CONFIG_GLOBAL: &str = "__runtime_config__";

/// Default manifest file name inside a version directory.
pub const DEFAULT_MANIFEST_FILE: &str = "manifest.json";

/// Default entry (bootstrap) document inside a version directory.
pub const DEFAULT_ENTRY_FILE: &str = "index.html";

/// Time a listener teardown waits for in-flight connections (2 s).
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Top-level configuration for the local server and orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface the listener binds to.
    pub bind_host: String,
    /// Manifest file name looked up in every version directory.
    pub manifest_file: String,
    /// Entry document served for the bootstrap path.
    pub entry_file: String,
    /// Hard bound on parent-chain length.
    pub max_chain_depth: usize,
    /// Milliseconds a listener teardown waits before aborting the serve task.
    pub shutdown_grace_ms: u64,
    /// Host-defined keys merged into every bootstrap runtime configuration.
    pub runtime_config: Map<String, Value>,
    /// Recompute content hashes of a version's own files before activating it.
    pub verify_hashes_on_load: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            entry_file: DEFAULT_ENTRY_FILE.to_string(),
            max_chain_depth: MAX_CHAIN_DEPTH,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            runtime_config: Map::new(),
            verify_hashes_on_load: false,
        }
    }
}

impl ServerConfig {
    /// Options used when loading bundles under this configuration.
    pub fn load_options(&self) -> crate::bundle::LoadOptions {
        crate::bundle::LoadOptions {
            manifest_file: self.manifest_file.clone(),
            entry_file: self.entry_file.clone(),
            max_chain_depth: self.max_chain_depth,
        }
    }
}
