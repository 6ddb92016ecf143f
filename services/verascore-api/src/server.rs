use crate::cli::ServeArgs;
use crate::infra::{build_engine, definition_source, load_universe, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use verascore::config::AppConfig;
use verascore::error::AppError;
use verascore::scoring::ScoringService;
use verascore::telemetry;

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
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let definitions = definition_source(None, config.scoring.config_dir.clone());
    let universe = load_universe(config.scoring.universe_path.as_deref())?;
    let engine = build_engine(&definitions, universe)?;
    let scoring_service = Arc::new(ScoringService::new(engine, definitions));

    let app = with_operational_routes(scoring_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "scoring service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
