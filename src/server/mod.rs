mod listener;

pub use listener::Listener;

use crate::config::{watch_config_async, Config};
use crate::metrics::Metrics;
use crate::proxy::ProxyHandler;
use crate::router::Router;
use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

/// Routing state shared by every connection.
///
/// Requests take one snapshot of the router and evaluate against it to
/// completion; reloads publish a fully built router in a single store.
pub struct SharedState {
    router: ArcSwap<Router>,
}

impl SharedState {
    pub fn new(config: &Config) -> Self {
        let router = Router::from_config(config);
        Metrics::set_routes_loaded(router.len());
        Self {
            router: ArcSwap::from_pointee(router),
        }
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.load_full()
    }

    pub fn reload(&self, config: &Config) {
        let router = Router::from_config(config);
        let count = router.len();

        self.router.store(Arc::new(router));
        Metrics::set_routes_loaded(count);

        info!("Router reloaded with {} routes", count);
    }
}

pub struct Server {
    config_path: PathBuf,
    config: Config,
    state: Arc<SharedState>,
    proxy: Arc<ProxyHandler>,
}

impl Server {
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        let state = Arc::new(SharedState::new(&config));

        Self {
            config_path,
            config,
            state,
            proxy: Arc::new(ProxyHandler::new()),
        }
    }

    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();

        for (name, entrypoint) in &self.config.entrypoints {
            let listener = Listener::new(
                name.clone(),
                entrypoint.address.clone(),
                Arc::clone(&self.state),
                Arc::clone(&self.proxy),
            );

            let listener_name = name.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = listener.serve().await {
                    error!("Listener '{}' error: {:#}", listener_name, e);
                }
            }));
        }

        let config_path = self.config_path.clone();
        let state = Arc::clone(&self.state);
        let watcher_handle = tokio::spawn(async move {
            let (mut rx, _handle) = watch_config_async(config_path).await;

            apply_reloads(&mut rx, &state).await;
        });

        info!("Server started with hot reload enabled, waiting for shutdown signal");

        shutdown_signal().await;

        info!("Shutdown signal received, stopping server");

        watcher_handle.abort();
        for handle in handles {
            handle.abort();
        }

        info!("Server stopped");

        Ok(())
    }

    pub fn reload_config(&self, config: &Config) -> Result<()> {
        config.validate()?;
        self.state.reload(config);
        info!("Configuration reloaded manually");
        Ok(())
    }
}

/// Applies every config the watcher publishes until the channel closes.
async fn apply_reloads(rx: &mut broadcast::Receiver<Config>, state: &SharedState) {
    loop {
        match rx.recv().await {
            Ok(new_config) => {
                info!("Hot reloading configuration...");
                state.reload(&new_config);
            }
            Err(RecvError::Lagged(skipped)) => {
                // Older versions were superseded, the next recv yields a newer one
                warn!("Config watcher lagged, skipped {} versions", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
