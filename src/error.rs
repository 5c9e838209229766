// Error taxonomy shared by bundles, the local server and the orchestrator.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse reason a bundle could not be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailure {
    Missing,
    Corrupt,
}

#[derive(Debug, Error)]
pub enum BundleLoadError {
    #[error("manifest missing at {}", path.display())]
    Missing { path: PathBuf },
    #[error("bundle at {} is corrupt: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },
}

impl BundleLoadError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn reason(&self) -> LoadFailure {
        match self {
            Self::Missing { .. } => LoadFailure::Missing,
            Self::Corrupt { .. } => LoadFailure::Corrupt,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot activate version {version}: {detail}")]
    Swap { version: String, detail: String },
    #[error("another transition is already in progress")]
    TransitionInProgress,
    #[error("server has been shut down")]
    Stopped,
    #[error("restart requested but no listener is running")]
    NotListening,
    #[error("transition task ended without reporting a result")]
    TransitionAbandoned,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    BundleLoad(#[from] BundleLoadError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("no rollback directory or baseline is known")]
    NoRollbackTarget,
    #[error("version directory {} was discarded by a reset", .0.display())]
    UntrustedVersion(PathBuf),
    #[error("content hash mismatch in {} for {files:?}", directory.display())]
    IntegrityMismatch {
        directory: PathBuf,
        files: Vec<String>,
    },
}
