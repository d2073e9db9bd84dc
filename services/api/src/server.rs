use crate::cli::ServeArgs;
use crate::infra::{demo_reference_data, AppState};
use crate::routes::with_posting_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use posting_engine::config::AppConfig;
use posting_engine::error::AppError;
use posting_engine::telemetry;
use posting_engine::workflows::posting::{
    InMemoryPostingStore, InMemoryReferenceData, PostingService,
};
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

    let institution = config.engine.institution_id.clone();
    let reference = if args.empty {
        InMemoryReferenceData::default()
    } else {
        demo_reference_data(&institution)
    };
    let posting_service = Arc::new(
        PostingService::new(
            institution.clone(),
            Arc::new(InMemoryPostingStore::default()),
            Arc::new(reference),
        )
        .with_auto_post_limit(config.engine.auto_post_max_per_supervisor),
    );

    let app = with_posting_routes(posting_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, %institution, "posting engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
