use crate::cli::ServeArgs;
use crate::infra::{load_snapshot, matching_config, AppState, InMemoryDocumentStore};
use crate::routes::with_matching_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use philip_sophy::config::AppConfig;
use philip_sophy::error::AppError;
use philip_sophy::matching::engine::ProfileMatchingEngine;
use philip_sophy::matching::router::MatchingApi;
use philip_sophy::telemetry;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryDocumentStore::default());
    for path in &args.snapshot {
        let snapshot = load_snapshot(path)?;
        info!(cohort = %snapshot.cohort.id, path = %path.display(), "loaded cohort snapshot");
        store.load(snapshot);
    }

    let engine = ProfileMatchingEngine::new(store, matching_config(&config.matching));
    let api = Arc::new(MatchingApi::new(engine, None));

    let app = with_matching_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "profile matching service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
