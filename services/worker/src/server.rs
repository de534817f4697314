use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use reengage::config::AppConfig;
use reengage::error::AppError;
use reengage::telemetry;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{build_dispatcher, seed_store, AppState};
use crate::routes::{engagement_router, with_operational_routes};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let dispatcher = build_dispatcher(&config, None);
    if let Some(seed) = args.seed.take() {
        seed_store(dispatcher.orchestrator().store().as_ref(), &seed).await?;
    }

    let app = with_operational_routes(engagement_router(dispatcher))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        customers_table = %config.store.customers_table,
        "re-engagement worker ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
