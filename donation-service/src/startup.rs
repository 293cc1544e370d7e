//! Application startup and lifecycle management.

use crate::config::DonationConfig;
use crate::handlers;
use crate::middleware::require_edit_posts;
use crate::services::{
    Database, DonationEvents, DonationRepository, DonorRepository,
    FieldPersistence, PurchaseKeyGenerator, SubscriptionRepository,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{make_request_span, request_id_middleware};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: DonationConfig,
    pub db: Database,
    pub donations: DonationRepository,
    pub donors: DonorRepository,
    pub subscriptions: SubscriptionRepository,
    pub fields: FieldPersistence,
}

impl AppState {
    /// Wire the repositories over `db` with the default event listeners.
    pub fn new(config: DonationConfig, db: Database) -> Self {
        let purchase_keys = PurchaseKeyGenerator::new(config.purchase_key_secret.clone());
        let donations =
            DonationRepository::new(&db, DonationEvents::with_default_listeners(), purchase_keys);
        let donors = DonorRepository::new(&db);
        let subscriptions = SubscriptionRepository::new(&db);
        let fields = FieldPersistence::new(donations.clone(), donors.clone());

        Self {
            config,
            db,
            donations,
            donors,
            subscriptions,
            fields,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let donor_routes = Router::new()
        .route("/donors", get(handlers::donors::list_donors))
        .route("/donors/:id", get(handlers::donors::get_donor))
        .route_layer(middleware::from_fn(require_edit_posts));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/gateways/stripe/webhook",
            post(handlers::gateways::stripe_webhook),
        )
        .merge(donor_routes)
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    addr: SocketAddr,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: DonationConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: DonationConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: DonationConfig, run_migrations: bool) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        Self::with_database(config, db).await
    }

    /// Build the application over an existing database handle.
    pub async fn with_database(config: DonationConfig, db: Database) -> Result<Self, AppError> {
        let host = config.common.host.as_str();
        let port = config.common.port;
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            tracing::error!(error = %e, host = %host, port = port, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let addr = listener.local_addr()?;

        tracing::info!(addr = %addr, "Donation service listener bound");

        Ok(Self {
            addr,
            listener,
            state: AppState::new(config, db),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the application state.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = %self.state.config.service_name,
            version = %self.state.config.service_version,
            addr = %self.addr,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router(self.state)).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
