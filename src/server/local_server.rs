// Local server lifecycle: listener binding, atomic bundle swap, rebind and shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handler::{normalize_prefix, router, ActiveSite, ServingState};
use super::stats::ServerStatsSnapshot;
use crate::bundle::AssetBundle;
use crate::config::ServerConfig;
use crate::error::ServerError;

/// Completion of a transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// A listener was (re)bound and is serving the bundle.
    Ready { port: u16 },
    /// The bundle was replaced behind the existing listener.
    Swapped { port: u16 },
}

impl ServerEvent {
    pub fn port(&self) -> u16 {
        match self {
            Self::Ready { port } | Self::Swapped { port } => *port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Listening,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Prefix every served path is mounted under.
    pub url_prefix: String,
    /// Replace the bundle behind the running listener.
    pub is_restart: bool,
    /// Tear the listener down and bind again even when a swap would do.
    pub force_recreate: bool,
}

/// Handle to a pending transition. Resolves exactly once.
///
/// Dropping it does not cancel the transition; the spawned task still runs
/// to completion.
pub struct Transition {
    rx: oneshot::Receiver<Result<ServerEvent, ServerError>>,
}

impl Transition {
    fn completed(result: Result<ServerEvent, ServerError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl Future for Transition {
    type Output = Result<ServerEvent, ServerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(ServerError::TransitionAbandoned)))
    }
}

struct ListenerSlot {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

struct Inner {
    config: ServerConfig,
    serving: Arc<ServingState>,
    listener: tokio::sync::Mutex<Option<ListenerSlot>>,
    state: Mutex<ServerState>,
    /// Port of the live listener. `None` whenever nothing is listening.
    port: Mutex<Option<u16>>,
    /// Port a rebind tries first: the last one successfully bound.
    preferred_port: Mutex<Option<u16>>,
    transition_lock: Arc<tokio::sync::Mutex<()>>,
}

/// HTTP server for the active asset bundle.
///
/// Must be driven from inside a tokio runtime.
pub struct LocalServer {
    inner: Arc<Inner>,
}

impl LocalServer {
    pub fn new(config: ServerConfig) -> Self {
        let serving = Arc::new(ServingState::new(config.runtime_config.clone()));
        Self {
            inner: Arc::new(Inner {
                config,
                serving,
                listener: tokio::sync::Mutex::new(None),
                state: Mutex::new(ServerState::Uninitialized),
                port: Mutex::new(None),
                preferred_port: Mutex::new(None),
                transition_lock: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    /// Start serving `bundle`, or swap it in behind the running listener.
    ///
    /// Returns immediately; the returned handle resolves once with the outcome.
    /// A call made while another transition is pending fails fast with
    /// [`ServerError::TransitionInProgress`].
    pub fn initialize(&self, bundle: Arc<AssetBundle>, options: InitOptions) -> Transition {
        let guard = match self.inner.transition_lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    "rejecting transition to version {}: another one is in progress",
                    bundle.version()
                );
                return Transition::completed(Err(ServerError::TransitionInProgress));
            }
        };

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let version = bundle.version().to_string();
            let result = inner.run_transition(bundle, options).await;
            match &result {
                Ok(event) => info!("transition to version {} complete: {:?}", version, event),
                Err(e) => error!("transition to version {} failed: {}", version, e),
            }
            // Release before reporting so the caller may start the next transition right away.
            drop(guard);
            if tx.send(result).is_err() {
                debug!("transition result for version {} had no receiver", version);
            }
        });

        Transition { rx }
    }

    /// Stop accepting connections and release the port. Terminal.
    pub async fn shutdown(&self) {
        let _guard = self.inner.transition_lock.lock().await;
        let slot = self.inner.listener.lock().await.take();
        if let Some(slot) = slot {
            info!("shutting down local server on port {}", slot.port);
            self.inner.stop_slot(slot).await;
        }
        *self.inner.state.lock() = ServerState::Stopped;
        *self.inner.port.lock() = None;
    }

    pub fn port(&self) -> Option<u16> {
        *self.inner.port.lock()
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    pub fn active_version(&self) -> Option<String> {
        self.inner
            .serving
            .snapshot()
            .map(|site| site.bundle.version().to_string())
    }

    pub fn active_bundle(&self) -> Option<Arc<AssetBundle>> {
        self.inner
            .serving
            .snapshot()
            .map(|site| Arc::clone(&site.bundle))
    }

    pub fn stats(&self) -> ServerStatsSnapshot {
        self.inner.serving.stats.snapshot()
    }

    /// Build a URL on this server for `path`.
    pub fn url_for(&self, path: &str) -> Option<String> {
        let port = self.port()?;
        Some(format!(
            "http://{}:{}/{}",
            self.inner.config.bind_host,
            port,
            path.trim_start_matches('/')
        ))
    }
}

impl Inner {
    async fn run_transition(
        &self,
        bundle: Arc<AssetBundle>,
        options: InitOptions,
    ) -> Result<ServerEvent, ServerError> {
        if *self.state.lock() == ServerState::Stopped {
            return Err(ServerError::Stopped);
        }

        let site = Arc::new(ActiveSite {
            bundle,
            url_prefix: normalize_prefix(&options.url_prefix),
        });

        let mut listener = self.listener.lock().await;
        let running_port = listener.as_ref().map(|slot| slot.port);

        if running_port.is_none() && options.is_restart {
            return Err(ServerError::NotListening);
        }
        if let Err(e) = check_bootable(&site.bundle).await {
            return Err(ServerError::Swap {
                version: site.bundle.version().to_string(),
                detail: format!("{:#}", e),
            });
        }

        if let (Some(port), false) = (running_port, options.force_recreate) {
            if !options.is_restart {
                debug!("initialize on a running listener, treating as swap");
            }
            let previous = self.serving.swap(site);
            self.serving.stats.record_swap();
            if let Some(previous) = previous {
                debug!("swapped away from version {}", previous.bundle.version());
            }
            return Ok(ServerEvent::Swapped { port });
        }

        let rebinding = listener.is_some();
        if let Some(slot) = listener.take() {
            info!("recreating listener on port {}", slot.port);
            self.stop_slot(slot).await;
            *self.state.lock() = ServerState::Uninitialized;
            *self.port.lock() = None;
        }

        let preferred = *self.preferred_port.lock();
        let tcp = self.bind(preferred).await?;
        let port = match tcp.local_addr() {
            Ok(addr) => addr.port(),
            Err(source) => {
                return Err(ServerError::ListenerBind {
                    addr: self.config.bind_host.clone(),
                    source,
                })
            }
        };

        // The first request on the new listener must already see this bundle.
        self.serving.swap(site);
        if rebinding {
            self.serving.stats.record_rebind();
        }
        *listener = Some(self.spawn_serve(tcp, port));
        *self.port.lock() = Some(port);
        *self.preferred_port.lock() = Some(port);
        *self.state.lock() = ServerState::Listening;
        info!("local server listening on {}:{}", self.config.bind_host, port);

        Ok(ServerEvent::Ready { port })
    }

    /// Bind on the remembered port when there is one, otherwise on an ephemeral port.
    async fn bind(&self, preferred: Option<u16>) -> Result<TcpListener, ServerError> {
        if let Some(port) = preferred {
            let addr = format!("{}:{}", self.config.bind_host, port);
            match TcpListener::bind(&addr).await {
                Ok(tcp) => return Ok(tcp),
                Err(e) => warn!("could not rebind {}: {}, picking a new port", addr, e),
            }
        }
        let addr = format!("{}:0", self.config.bind_host);
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::ListenerBind { addr, source })
    }

    fn spawn_serve(&self, tcp: TcpListener, port: u16) -> ListenerSlot {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::clone(&self.serving));

        let task = tokio::spawn(async move {
            let result = axum::serve(tcp, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("local server on port {} exited: {}", port, e);
            }
        });

        ListenerSlot {
            port,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// Signal the serve task and wait for it, aborting after the grace period.
    async fn stop_slot(&self, mut slot: ListenerSlot) {
        if let Some(tx) = slot.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        if tokio::time::timeout(grace, &mut slot.task).await.is_err() {
            warn!(
                "listener on port {} did not drain within {:?}, aborting",
                slot.port, grace
            );
            slot.task.abort();
            let _ = slot.task.await;
        }
    }
}

/// The entry document must still be readable before a bundle goes live.
async fn check_bootable(bundle: &AssetBundle) -> Result<()> {
    let entry = bundle
        .resolve_entry()
        .ok_or_else(|| anyhow!("entry document {} does not resolve", bundle.entry_file()))?;
    let meta = tokio::fs::metadata(&entry.absolute_path)
        .await
        .with_context(|| format!("entry document {}", entry.absolute_path.display()))?;
    if !meta.is_file() {
        return Err(anyhow!("{} is not a file", entry.absolute_path.display()));
    }
    Ok(())
}
