//! # Screening Platform API Server
//!
//! The thin HTTP surface in front of the Investigation & Monitoring Engine
//! (spec.md §2 "AMBIENT HTTP surface"). It owns no screening logic itself —
//! it extracts an already-authenticated `RequestContext`/`TenantContext`
//! (spec.md §1: auth and multi-tenant filtering are non-goals of the core)
//! and calls into `screening_engine`/`screening_vigilance`.
//!
//! Composition root (spec.md §9 "Globals"): the registry, rate limiter,
//! health monitor, cache store, audit sink, profile store and alert sink
//! are constructed once here and wired into a single `Engine`-shaped set
//! of `Arc`s, shut down in reverse order on graceful shutdown.

use screening_core::{Config, DatabasePool, TenantContext, TenantId};
use screening_engine::{
    AllowAllCompliance, AlwaysConsentedStore, ControllerThresholds, IterationController, PostgresProfileStore,
    ProfileStore, QueryPlanner, ScreeningEngine, ScreeningOrchestrator,
};
use screening_gateway::{HealthMonitor, HealthProbe, PostgresCacheStore, ProviderRegistry, QueryExecutor, RateLimiter};
use screening_vigilance::{InMemoryScheduleStore, VigilanceMetrics, VigilanceScheduler};
use std::{collections::HashSet, net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod demo_providers;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod subject_directory;

use crate::{handlers::screenings, handlers::subjects, handlers::webhooks, state::AppState};
use axum::{routing::get, routing::post, Router};

/// Shared platform schema holding the tenant-agnostic `cache_entries` and
/// `profile_versions` tables (spec.md §3: `CachedResponse` is shared by all
/// screenings of the same subject; `ProfileVersion` is owned by the
/// subject, not a tenant schema). Distinct from the teacher's
/// per-tenant-business-data schemas, which this engine has none of.
const PLATFORM_SCHEMA: &str = "platform_shared";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    info!("starting screening-server");

    let config = Config::load()?;
    info!("configuration loaded");

    let db = DatabasePool::new(config.database.clone()).await?;
    db.create_tenant_schema(PLATFORM_SCHEMA).await?;
    let platform_pool = db
        .get_tenant_pool(&TenantContext {
            tenant_id: TenantId::new(),
            schema_name: PLATFORM_SCHEMA.to_string(),
        })
        .await?;
    info!("database pool initialized");

    let encryption = Arc::new(screening_core::security::EncryptionService::new(&config.security)?);
    let error_metrics = Arc::new(screening_core::ErrorMetrics::new());
    let audit_logger = Arc::new(screening_core::AuditLogger::new(
        Arc::new(screening_core::audit::TracingAuditBackend::new()),
        error_metrics,
    ));

    let gateway_metrics = Arc::new(screening_gateway::GatewayMetrics::new(&config.metrics.namespace)?);
    let vigilance_metrics = VigilanceMetrics::new(&config.metrics.namespace)?;
    let metrics_registry = screening_core::MetricsRegistry::new(config.metrics.clone());
    let metrics_service = Arc::new(screening_core::MetricsService::new(metrics_registry));

    // Provider registry (spec §4.1): read-only after this point. Concrete
    // provider transports are a non-goal; these demo providers stand in for
    // them so the composition root is runnable end to end.
    let registry = ProviderRegistry::new(demo_providers::build_demo_providers());
    let health_monitor = HealthMonitor::default();
    let rate_limiter = RateLimiter::default();

    let cache_store: Arc<dyn screening_gateway::CacheStore> =
        Arc::new(PostgresCacheStore::new(platform_pool.clone()));

    let executor = Arc::new(
        QueryExecutor::new(registry.clone(), rate_limiter, health_monitor.clone(), cache_store)
            .with_audit_logger(audit_logger.clone())
            .with_encryption(encryption)
            .with_metrics(gateway_metrics.clone()),
    );

    let probe = HealthProbe::new(registry.clone(), health_monitor.clone(), Duration::from_secs(30));
    let probe_handle = probe.start();

    let planner = QueryPlanner::new(registry);
    let controller = IterationController::new(ControllerThresholds::default());
    let orchestrator = Arc::new(ScreeningOrchestrator::new(planner, executor, controller));

    let engine = Arc::new(
        ScreeningEngine::new(
            Arc::new(AllowAllCompliance),
            Arc::new(AlwaysConsentedStore),
            orchestrator,
            HashSet::from(["demo_synthesis".to_string()]),
            config.gateway.synthesis_confidence_cap,
        )
        .with_audit_logger(audit_logger.clone()),
    );

    let profile_store: Arc<dyn ProfileStore> = Arc::new(PostgresProfileStore::new(platform_pool));
    let schedule_store = Arc::new(InMemoryScheduleStore::new());
    let subject_directory = Arc::new(subject_directory::InMemorySubjectDirectory::new());

    let vigilance = Arc::new(
        VigilanceScheduler::new(
            schedule_store.clone(),
            profile_store.clone(),
            subject_directory.clone(),
            engine.clone(),
            Arc::new(screening_vigilance::BroadcastAlertSink::new(256)),
            vigilance_metrics,
            Duration::from_secs(config.vigilance.sweep_interval_seconds),
            config.vigilance.max_concurrent_rescreens as usize,
        )
        .with_audit_logger(audit_logger.clone()),
    );

    // `VigilanceScheduler::start` consumes `self` to run its own
    // interval/shutdown-watch loop; the webhook handler (spec §2 "webhook
    // intake for vigilance event triggers") needs a live handle to call
    // `trigger_now` on instead, so the composition root runs the periodic
    // sweep itself against the same `Arc<VigilanceScheduler>` the router
    // shares, rather than handing the scheduler away.
    let (vigilance_shutdown_tx, mut vigilance_shutdown_rx) = tokio::sync::watch::channel(());
    let vigilance_handle = {
        let vigilance = vigilance.clone();
        let mut ticker = tokio::time::interval(Duration::from_secs(config.vigilance.sweep_interval_seconds));
        tokio::spawn(async move {
            info!("vigilance scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = vigilance.run_cycle().await {
                            warn!(error = %e, "vigilance sweep failed");
                        }
                    }
                    _ = vigilance_shutdown_rx.changed() => {
                        info!("vigilance scheduler shutting down");
                        break;
                    }
                }
            }
        })
    };

    let state = AppState {
        config: config.clone(),
        engine,
        profile_store,
        schedule_store,
        subject_directory,
        vigilance,
        metrics: metrics_service,
        vigilance_shutdown: Arc::new(vigilance_shutdown_tx),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "screening-server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    probe_handle.abort();
    vigilance_handle.abort();
    info!("screening-server shutdown complete");
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/screenings", post(screenings::start_screening))
        .route("/screenings/:id", get(screenings::get_screening))
        .route("/subjects/:id/profile", get(subjects::get_profile))
        .route("/webhooks/vigilance/:subject_id", post(webhooks::trigger_vigilance_check))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_context_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                ),
        )
        .with_state(state)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screening_api=info,screening_engine=info,screening_gateway=info,screening_vigilance=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c"),
        _ = terminate => info!("received terminate signal"),
    }
}
