use crate::cli::ServeArgs;
use crate::infra::{seed_demo, AppState};
use crate::routes::with_calibration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use competency_core::calibration::{CalibrationService, InMemoryCalibrationStore};
use competency_core::config::AppConfig;
use competency_core::error::AppError;
use competency_core::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.seed_demo {
        config.store.seed_demo = true;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryCalibrationStore::new());
    let service = Arc::new(CalibrationService::new(store.clone()));
    if config.store.seed_demo {
        let demo = seed_demo(&store, &service)?;
        info!(
            organization_id = %demo.scope.organization_id,
            caller_user_id = %demo.scope.caller_user_id,
            matrix_id = %demo.matrix_id,
            manager_group_id = %demo.manager_group_id,
            reviewees = demo.reviewees.len(),
            "demo data available"
        );
    }

    let app = with_calibration_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "competency calibration service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
