//! Application startup and lifecycle management.

use crate::config::{BillingConfig, StorageBackend};
use crate::handlers::{health, invoices, purchases, recurring, subscribers};
use crate::services::{
    init_metrics, Database, EntitlementApplier, HttpEmailNotifier, InvoiceGenerator, LogNotifier,
    MemoryStore, Notifier, PurchaseLedger, Stores, TemplateService,
};
use axum::{
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, RequestId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub stores: Stores,
    pub ledger: PurchaseLedger,
    pub generator: InvoiceGenerator,
    pub templates: TemplateService,
}

impl AppState {
    /// Wire the services over `stores`.
    pub fn new(
        service_name: String,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        config: &BillingConfig,
    ) -> Self {
        let entitlements =
            EntitlementApplier::new(stores.clone(), notifier, config.notification.clone());
        Self {
            service_name,
            ledger: PurchaseLedger::new(stores.clone(), entitlements),
            generator: InvoiceGenerator::new(stores.clone()),
            templates: TemplateService::new(stores.clone()),
            stores,
        }
    }
}

/// Build the HTTP router for `state`.
pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .map(|id| id.0.clone())
                .unwrap_or_default();
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route(
            "/api/billing/purchase/initiate",
            post(purchases::initiate_purchase),
        )
        .route(
            "/api/billing/payment/callback",
            post(purchases::payment_callback),
        )
        .route(
            "/api/billing/oxapay/callback",
            post(purchases::payment_callback),
        )
        .route(
            "/api/billing/purchases/:order_id",
            get(purchases::get_purchase),
        )
        .route(
            "/api/recurring-invoices",
            get(recurring::list_templates).post(recurring::create_template),
        )
        .route(
            "/api/recurring-invoices/:id",
            get(recurring::get_template)
                .patch(recurring::update_template)
                .delete(recurring::delete_template),
        )
        .route(
            "/api/recurring-invoices/:id/generate",
            post(recurring::generate_invoice),
        )
        .route("/api/invoices/:id", get(invoices::get_invoice))
        .route(
            "/api/subscribers/:id/entitlement",
            get(subscribers::get_entitlement),
        )
        .layer(trace_layer)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        let notifier: Arc<dyn Notifier> = match &config.notification.email_endpoint {
            Some(endpoint) => Arc::new(HttpEmailNotifier::new(
                endpoint.clone(),
                config.notification.timeout,
            )),
            None => Arc::new(LogNotifier),
        };
        Self::build_with_notifier(config, notifier).await
    }

    /// Build with an explicit notifier; tests use this to observe deliveries.
    pub async fn build_with_notifier(
        config: BillingConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let stores = match config.storage.backend {
            StorageBackend::Postgres => {
                let database = config.storage.database.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("Database configuration missing"))
                })?;
                let db = Database::new(
                    database.url.expose_secret(),
                    database.max_connections,
                    database.min_connections,
                    config.storage.timeout,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;

                Stores::from_backend(Arc::new(db), config.storage.timeout)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Stores::from_backend(Arc::new(MemoryStore::new()), config.storage.timeout)
            }
        };

        Self::build_with_stores(config, stores, notifier).await
    }

    /// Build over already constructed stores.
    pub async fn build_with_stores(
        config: BillingConfig,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let state = AppState::new(config.service_name.clone(), stores, notifier, &config);

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            http_port = http_port,
            storage = state.stores.health.backend(),
            "Billing service listener bound"
        );

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Storage handles backing this application.
    pub fn stores(&self) -> &Stores {
        &self.state.stores
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = %self.state.service_name,
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router(self.state))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
