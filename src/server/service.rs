//! Shared store server

use crate::backend::SharedBackend;
use crate::common::{Result, ServerConfig, Storage};
use crate::server::http::{create_router, PollState};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct PollServer {
    config: ServerConfig,
}

impl PollServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Open the configured storage and wrap it as the shared record.
    pub fn build_state(&self) -> Result<PollState> {
        let storage = Storage::open(self.config.storage, &self.config.data_path)?;
        let store = Arc::new(SharedBackend::new(storage, self.config.watch_capacity));
        Ok(PollState {
            store,
            reject_regressions: self.config.reject_regressions,
        })
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let state = self.build_state()?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Starting revealpoll server");
        tracing::info!("  HTTP API: {}", local_addr);
        tracing::info!("  Storage: {:?}", self.config.storage);
        tracing::info!("  Data path: {}", self.config.data_path.display());
        tracing::info!("  Reject regressions: {}", self.config.reject_regressions);
        match state.store.current()? {
            Some(tally) => tracing::info!("  Current tally: {}", tally),
            None => tracing::info!("  Tally not initialized yet"),
        }

        let router = create_router(state, self.config.max_body_bytes);
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
