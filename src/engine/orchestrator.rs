// Update orchestration: tracks current/rollback directories and drives the local server.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bundle::AssetBundle;
use crate::config::ServerConfig;
use crate::error::OrchestratorError;
use crate::server::{InitOptions, LocalServer, ServerEvent, ServerState};

/// Every path held here is canonical, so aliases of one directory compare equal.
#[derive(Debug, Default)]
struct Directories {
    current: Option<PathBuf>,
    rollback: Option<PathBuf>,
    /// Directories a reset discarded; never activated again.
    untrusted: HashSet<PathBuf>,
}

/// Canonical form of `dir`, or `dir` itself when it cannot be resolved.
fn canonical_dir(dir: &Path) -> PathBuf {
    fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

pub struct UpdateOrchestrator {
    server: Arc<LocalServer>,
    config: ServerConfig,
    url_prefix: String,
    /// Version shipped with the host, the last resort for a reset.
    baseline: Option<PathBuf>,
    dirs: Mutex<Directories>,
}

impl UpdateOrchestrator {
    pub fn new(
        server: Arc<LocalServer>,
        config: ServerConfig,
        baseline: Option<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            server,
            config,
            url_prefix: url_prefix.into(),
            baseline: baseline.as_deref().map(canonical_dir),
            dirs: Mutex::new(Directories::default()),
        }
    }

    /// Load `version_dir` (chained onto `base_dir` when given) and make it live.
    ///
    /// Starts the listener on first use and swaps behind it afterwards. The
    /// tracked directories only change once the server reports success.
    pub async fn activate(
        &self,
        version_dir: impl AsRef<Path>,
        base_dir: Option<&Path>,
    ) -> Result<ServerEvent, OrchestratorError> {
        let version_dir = version_dir.as_ref();
        if self.is_untrusted(version_dir) {
            warn!("refusing to activate discarded version {}", version_dir.display());
            return Err(OrchestratorError::UntrustedVersion(version_dir.to_path_buf()));
        }

        let options = self.config.load_options();
        let parent = match base_dir {
            Some(base) => Some(Arc::new(AssetBundle::construct_with(
                base, None, None, &options,
            )?)),
            None => None,
        };
        let rollback = parent.as_ref().map(|p| p.root_directory().to_path_buf());
        let bundle = AssetBundle::construct_with(version_dir, None, parent, &options)?;
        let current = bundle.root_directory().to_path_buf();

        if self.config.verify_hashes_on_load {
            let mismatched = bundle.verify_hashes();
            if !mismatched.is_empty() {
                return Err(OrchestratorError::IntegrityMismatch {
                    directory: version_dir.to_path_buf(),
                    files: mismatched,
                });
            }
        }

        let is_restart = self.server.state() == ServerState::Listening;
        info!(
            "activating version {} from {} (restart={})",
            bundle.version(),
            version_dir.display(),
            is_restart
        );
        let event = self
            .server
            .initialize(
                Arc::new(bundle),
                InitOptions {
                    url_prefix: self.url_prefix.clone(),
                    is_restart,
                    force_recreate: false,
                },
            )
            .await?;

        let mut dirs = self.dirs.lock();
        dirs.current = Some(current);
        dirs.rollback = rollback;
        Ok(event)
    }

    /// Re-activate whatever `reset` (or the last activation) left as current.
    pub async fn activate_current(&self) -> Result<ServerEvent, OrchestratorError> {
        let (current, parent) = {
            let dirs = self.dirs.lock();
            (dirs.current.clone(), dirs.rollback.clone())
        };
        let current = current
            .or_else(|| self.baseline.clone())
            .ok_or(OrchestratorError::NoRollbackTarget)?;
        self.activate(&current, parent.as_deref()).await
    }

    /// Discard the current version and point at the rollback target.
    ///
    /// Does not touch the server; call [`activate_current`](Self::activate_current)
    /// (or `activate` with the accessors) to serve the rolled-back version.
    pub fn reset(&self) -> Result<(), OrchestratorError> {
        let mut dirs = self.dirs.lock();
        let target = dirs
            .rollback
            .clone()
            .or_else(|| self.baseline.clone())
            .ok_or(OrchestratorError::NoRollbackTarget)?;

        if let Some(current) = dirs.current.take() {
            if current != target {
                info!("discarding version directory {}", current.display());
                dirs.untrusted.insert(current);
            }
        }

        debug!("reset target is {}", target.display());
        dirs.rollback = self.baseline.clone().filter(|baseline| *baseline != target);
        dirs.current = Some(target);
        Ok(())
    }

    pub fn get_directory(&self) -> Option<PathBuf> {
        self.dirs.lock().current.clone()
    }

    pub fn get_parent_directory(&self) -> Option<PathBuf> {
        self.dirs.lock().rollback.clone()
    }

    pub fn baseline_directory(&self) -> Option<&Path> {
        self.baseline.as_deref()
    }

    pub fn is_untrusted(&self, dir: &Path) -> bool {
        self.dirs.lock().untrusted.contains(&canonical_dir(dir))
    }

    pub fn server(&self) -> &Arc<LocalServer> {
        &self.server
    }
}
