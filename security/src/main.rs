use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use shield_config::AppConfig;
use shield_middleware::AuthMiddlewareFactory;
use shield_observability::{info, init_tracing, observability, TracingConfig};
use shield_security::{handlers, AppState, MonitorScheduler};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(TracingConfig::for_service("security-service"));
    let config = AppConfig::from_env();

    let store = shield_database::connect(&config.database)
        .await
        .context("failed to open the security store")?;
    info!(backend = store.backend_name(), "Security store ready");

    let state = AppState::new(&config, store);

    let monitor = if config.feature_toggles.monitor_enabled() {
        Some(MonitorScheduler::start(state.monitor.clone(), &config.monitor))
    } else {
        info!("Security monitor disabled by feature toggle");
        None
    };

    let port = config.server.port;
    info!(port, "Starting Cyber Security Shield");

    // Shared by all workers.
    let limiter = state.rate_limiter();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);
        let limiter = limiter.clone();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(AuthMiddlewareFactory::new(state.keys.clone()))
            .wrap(observability("security-service"))
            .wrap(cors)
            .configure(|cfg| handlers::configure(cfg, limiter))
    })
    .bind(("0.0.0.0", port))
    .with_context(|| format!("failed to bind port {}", port))?
    .run()
    .await?;

    if let Some(handle) = monitor {
        handle.shutdown().await;
    }
    Ok(())
}
