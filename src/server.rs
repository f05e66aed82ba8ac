//! Server bootstrap: wiring, router composition, and graceful shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::bridge::EventBridge;
use crate::config::GatewayConfig;
use crate::domain::{DefaultValidator, EventBus};
use crate::error::GatewayError;
use crate::persistence::{InMemoryUserStore, PostgresUserStore, UserStore};
use crate::service::{RequestActor, UserService};
use crate::ws::ConnectionHub;
use crate::ws::handler::ws_handler;

/// Upper bound on a single REST request. WebSocket routes are not covered.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the full HTTP router: REST, WebSocket, tracing and CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router().layer(TimeoutLayer::new(HTTP_REQUEST_TIMEOUT)))
        .route("/ws_users", get(ws_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A wired gateway: the request actor and event bridge are already running.
///
/// Both background tasks share one lifetime token, cancelled when the
/// server shuts down.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    state: AppState,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Picks the user store from `config` and wires every component.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if persistence is enabled and
    /// the database cannot be reached or migrated.
    pub async fn build(config: GatewayConfig) -> Result<Self, GatewayError> {
        let store: Arc<dyn UserStore> = if config.persistence_enabled {
            Arc::new(PostgresUserStore::connect(&config).await?)
        } else {
            tracing::info!("persistence disabled, using in-memory user store");
            Arc::new(InMemoryUserStore::new())
        };
        Ok(Self::with_store(config, store))
    }

    /// Wires every component around an existing store. Must run inside a
    /// Tokio runtime.
    #[must_use]
    pub fn with_store(config: GatewayConfig, store: Arc<dyn UserStore>) -> Self {
        let cancel = CancellationToken::new();
        let bus = EventBus::new(config.event_topic.clone(), config.event_bus_capacity);

        let (actor, actor_task) = RequestActor::spawn(
            store,
            Arc::new(DefaultValidator::new()),
            Arc::new(bus.clone()),
            config.actor_config(),
            cancel.clone(),
        );
        let user_service = UserService::new(actor, config.response_timeout());
        let hub = Arc::new(ConnectionHub::new(
            user_service.clone(),
            config.origin_policy(),
            config.session_config(),
        ));
        let bridge_task = EventBridge::new(
            Arc::new(bus),
            Arc::clone(&hub),
            config.event_topic.clone(),
            config.bridge_retry_backoff(),
        )
        .spawn(cancel.clone());

        Self {
            config,
            state: AppState { user_service, hub },
            cancel,
            tasks: vec![actor_task, bridge_task],
        }
    }

    /// Returns the shared handler state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Returns the token that stops the actor and the bridge.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Binds `listen_addr` and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if binding or serving fails.
    pub async fn serve(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves, then closes every
    /// session and stops the background tasks.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if serving fails.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, environment = %self.config.environment, "server listening");

        let hub = Arc::clone(&self.state.hub);
        let cancel = self.cancel.clone();
        let result = axum::serve(listener, build_router(self.state.clone()))
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("shutdown requested");
                hub.close_all().await;
                cancel.cancel();
            })
            .await;

        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!("server stopped");
        result
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
