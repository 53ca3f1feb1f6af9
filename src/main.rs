use std::sync::Arc;

use clinic_booking::{
    config::Config,
    db::{self, PgAppointmentStore},
    models::AppState,
    routes,
    service::AppointmentService,
};

use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::{header, HeaderValue};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let appointments = AppointmentService::new(
        PgAppointmentStore::new(pool.clone()),
        cfg.appointment_list_limit,
    );

    let state = AppState {
        db: pool,
        appointments: Arc::new(appointments),
        session_ttl_hours: cfg.session_ttl_hours,
    };

    let origins = if cfg.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed = cfg
            .allowed_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(parsed)
    };

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
