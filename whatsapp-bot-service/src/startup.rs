//! Application startup and lifecycle management.

use crate::config::BotConfig;
use crate::handlers::{health_check, metrics_endpoint, readiness_check, whatsapp_webhook};
use crate::services::{CatalogRepository, ConversationEngine, Database, EngineSettings, SessionStore};
use axum::{
    body::Body,
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{make_request_span, request_id_middleware};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    pub catalog: Arc<dyn CatalogRepository>,
    /// Transport scheme stripped from `From`/`To`, e.g. `whatsapp:`.
    pub address_prefix: Arc<str>,
}

impl AppState {
    /// Wires the engine to one backend serving both catalog and sessions.
    pub fn new<B>(backend: Arc<B>, settings: EngineSettings, address_prefix: &str) -> Self
    where
        B: CatalogRepository + SessionStore + 'static,
    {
        let catalog: Arc<dyn CatalogRepository> = backend.clone();
        let sessions: Arc<dyn SessionStore> = backend;
        Self {
            engine: Arc::new(ConversationEngine::new(catalog.clone(), sessions, settings)),
            catalog,
            address_prefix: Arc::from(address_prefix),
        }
    }
}

/// Routes plus the middleware stack. Requests slower than `request_timeout`
/// are answered with 408 and their unit of work is dropped.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/webhooks/whatsapp", post(whatsapp_webhook))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connects to PostgreSQL, applies migrations, and binds the listener.
    pub async fn build(config: BotConfig) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let settings = EngineSettings {
            menu_base_url: config.bot.public_menu_base_url.clone(),
            session_ttl: config.session_ttl(),
            default_customer_name: config.bot.default_customer_name.clone(),
        };
        let state = AppState::new(Arc::new(db), settings, &config.bot.whatsapp_address_prefix);
        let router = build_router(state, config.request_timeout());

        // Port 0 = random port for testing
        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "whatsapp-bot-service listening");

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
