//! Router, shared state and server lifecycle.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use gophkeeper_core::proto::routes;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AuthManager};
use crate::cleanup::spawn_cleanup_task;
use crate::config::ServerConfig;
use crate::deadline;
use crate::engine::SyncEngine;
use crate::error::ServerError;
use crate::handlers::{items, users};
use crate::storage::{SqliteStorage, Storage, StorageError, Store};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: SqliteStorage,
    pub auth: AuthManager,
    pub engine: SyncEngine,
    pub operation_timeout: Duration,
}

impl AppState {
    pub fn new(storage: SqliteStorage, config: &ServerConfig) -> Self {
        Self {
            storage,
            auth: AuthManager::new(config.token_ttl()),
            engine: SyncEngine::default(),
            operation_timeout: config.operation_timeout(),
        }
    }

    /// Run `f` atomically against the store on the blocking pool, under the
    /// per-call deadline.
    pub async fn call<T, E, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&dyn Store) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + Into<ServerError> + Send + 'static,
    {
        let storage = self.storage.clone();
        deadline::run_blocking(self.operation_timeout, move |ctx| storage.atomically(ctx, f)).await
    }

    /// Hash an account password on the blocking pool, outside any store
    /// transaction.
    pub async fn hash_password(&self, password: String) -> Result<String, ServerError> {
        let auth = self.auth.clone();
        deadline::run_blocking(self.operation_timeout, move |_| auth.hash_password(&password)).await
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    // Authenticated routes
    let authenticated = Router::new()
        .route(routes::LIST, post(items::list))
        .route(routes::SYNC_ITEM, post(items::sync_item))
        .route(routes::SYNC_USER, post(users::sync_user))
        .route(routes::DELETE_USER, post(users::delete_user))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Unauthenticated routes
    let public = Router::new()
        .route(routes::REGISTER, post(users::register))
        .route(routes::HEALTH, get(health));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        // max_payload_size is the only body limit; axum's 2 MB default is off
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Returns a future that resolves when the shutdown watch fires.
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    state: AppState,
    config: ServerConfig,
}

impl Server {
    /// Open the store and bind the listen address.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let storage = SqliteStorage::open(&config.database_dsn)?;
        Self::bind_with_state(AppState::new(storage, &config), config).await
    }

    pub async fn bind_with_state(state: AppState, config: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Self {
            listener,
            state,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests for at most
    /// `shutdown_timeout` and close the store.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let Self {
            listener,
            state,
            config,
        } = self;

        tracing::info!(addr = %listener.local_addr()?, "GophKeeper server listening");

        let cleanup = spawn_cleanup_task(
            state.storage.clone(),
            config.cleanup_interval(),
            config.operation_timeout(),
            shutdown.clone(),
        );

        let storage = state.storage.clone();
        let app = build_router(state, &config);
        let serve = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .into_future();

        let outcome = drain_with_timeout(serve, shutdown, config.shutdown_timeout()).await;

        cleanup.abort();
        let closed = storage.close();

        outcome?;
        closed?;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn drain_with_timeout<F>(
    serve: F,
    shutdown: watch::Receiver<bool>,
    timeout: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(serve);
    tokio::select! {
        res = &mut serve => Ok(res?),
        _ = async {
            wait_for_shutdown(shutdown).await;
            tracing::info!("shutting down, draining in-flight requests");
            tokio::time::sleep(timeout).await;
        } => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "graceful shutdown timed out");
            Err(anyhow::anyhow!("graceful shutdown timed out after {:?}", timeout))
        }
    }
}
