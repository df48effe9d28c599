mod routes;

use sqlx::PgPool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adlens_core::service::AnalyticsService;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = adlens_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match adlens_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let service = pool.map(|pool| Arc::new(AnalyticsService::postgres(&settings, pool)));
    if let Some(service) = &service {
        tokio::spawn(purge_cache_periodically(service.clone()));
    }
    tracing::info!(
        server_timezone = %settings.server_timezone,
        degraded = service.is_none(),
        "analytics service ready"
    );

    let app = routes::router(AppState { service });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn purge_cache_periodically(service: Arc<AnalyticsService>) {
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(600));
    loop {
        tick.tick().await;
        let purged = service.purge_cache().await;
        if purged > 0 {
            tracing::debug!(purged, "purged stale metrics cache entries");
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &adlens_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
