use crate::proxy::ProxyHandler;
use crate::server::SharedState;
use anyhow::{Context, Result};
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Accept loop for one entrypoint.
pub struct Listener {
    name: String,
    address: String,
    state: Arc<SharedState>,
    proxy: Arc<ProxyHandler>,
}

impl Listener {
    pub fn new(
        name: String,
        address: String,
        state: Arc<SharedState>,
        proxy: Arc<ProxyHandler>,
    ) -> Self {
        Self {
            name,
            address,
            state,
            proxy,
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self
            .address
            .parse()
            .with_context(|| format!("Invalid address: {}", self.address))?;

        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))
    }

    pub async fn serve(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound socket.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        info!(
            "Entrypoint '{}' listening on {}",
            self.name,
            listener.local_addr()?
        );

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);
            let proxy = Arc::clone(&self.proxy);
            let entrypoint = self.name.clone();

            tokio::spawn(async move {
                Self::serve_connection(TokioIo::new(stream), remote_addr, entrypoint, state, proxy)
                    .await;
            });
        }
    }

    async fn serve_connection<I>(
        io: I,
        remote_addr: SocketAddr,
        entrypoint: String,
        state: Arc<SharedState>,
        proxy: Arc<ProxyHandler>,
    ) where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            let state = Arc::clone(&state);
            let proxy = Arc::clone(&proxy);
            let entrypoint = entrypoint.clone();

            async move {
                // One router generation for the whole request
                let router = state.router();
                proxy
                    .handle(req, remote_addr, &entrypoint, &router, false)
                    .await
            }
        });

        // Auto-detect HTTP/1 or HTTP/2 (h2c)
        let builder = AutoBuilder::new(TokioExecutor::new());
        if let Err(e) = builder.serve_connection(io, service).await {
            debug!("Connection error from {}: {}", remote_addr, e);
        }
    }
}
