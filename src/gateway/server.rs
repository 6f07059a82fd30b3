//! HTTP server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};

use super::handlers::CompanyRepository;
use super::router::{AppState, create_router};
use crate::authorizer::Authorizer;
use crate::cache::{self, InMemoryCacheStore};
use crate::composer::ClaimsComposer;
use crate::config::Config;
use crate::{Error, Result};

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Sample API server protected by the authorizer
pub struct Gateway {
    config: Config,
    authorizer: Arc<Authorizer>,
    /// Kept for periodic eviction when claims are cached in-process
    memory_store: Option<Arc<InMemoryCacheStore>>,
}

impl Gateway {
    /// Create the server and its authorizer
    pub async fn new(config: Config) -> Result<Self> {
        let (store, memory_store) = cache::store_from_config(&config.cache).await?;
        info!(backend = store.backend_name(), "Claims cache ready");

        let composer = ClaimsComposer::from_config(&config.custom_claims);
        let authorizer = Arc::new(Authorizer::new(&config, store, composer)?);

        Ok(Self {
            config,
            authorizer,
            memory_store,
        })
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        self.authorizer.warm().await;

        if let Some(store) = self.memory_store.clone() {
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(EVICTION_INTERVAL);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let evicted = store.evict_expired();
                            if evicted > 0 {
                                debug!(evicted, remaining = store.len(), "Evicted expired claims");
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            });
        }

        let state = Arc::new(AppState {
            authorizer: Arc::clone(&self.authorizer),
            companies: CompanyRepository::default(),
        });
        let app = create_router(state, self.config.server.request_timeout);

        let listener = TcpListener::bind(addr).await?;

        info!(
            version = env!("CARGO_PKG_VERSION"),
            host = %self.config.server.host,
            port = self.config.server.port,
            api = %self.config.api.name,
            issuer = %self.config.oauth.issuer,
            "Listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let stats = self.authorizer.cache().stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            writes = stats.writes,
            "Claims cache statistics"
        );

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
