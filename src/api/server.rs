//! API Server
//!
//! Binds the router to a socket and runs until Ctrl+C or SIGTERM.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware, ADMIN_KEY_ENV},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::hall::BingoHall;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: ApiConfig,
    hall: Arc<BingoHall>,
}

impl ApiServer {
    pub fn new(hall: Arc<BingoHall>, config: ApiConfig) -> Self {
        Self { config, hall }
    }

    /// Admin key from the environment, falling back to the config file.
    fn admin_key(&self) -> Option<String> {
        std::env::var(ADMIN_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.config.admin_api_key.clone())
    }

    /// Start the API server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let admin_key = self.admin_key();
        if admin_key.is_none() {
            warn!("No admin API key configured; admin routes are open");
        }

        let app = create_app(self.hall.clone(), admin_key, &self.config);
        let addr = self.get_socket_addr()?;
        self.log_server_info(addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }

    fn get_socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    fn log_server_info(&self, addr: SocketAddr) {
        info!("Bingo hall listening on http://{}", addr);
        info!("   Stake tiers: {:?}", self.hall.stake_tiers());
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);
    }
}

/// Router plus the middleware stack. Tests drive this directly.
pub fn create_app(hall: Arc<BingoHall>, admin_key: Option<String>, config: &ApiConfig) -> axum::Router {
    let state = Arc::new(AppState {
        hall,
        admin_key,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    create_router(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(create_cors_layer(config.allowed_origins.clone()))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
