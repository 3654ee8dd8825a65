use actix_web::{web, App, HttpServer, middleware::Compress};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use otpauth::config::{signing_secret_from_env, AuthConfig};
use otpauth::notify::notifier_from_env;
use otpauth::openapi::ApiDoc;
use otpauth::rate_limit::InMemoryRateLimiter;
use otpauth::repo::AuthRepo;
use otpauth::session::SessionIssuer;
use otpauth::{config, AppState, AuthService, SecurityHeaders};
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let (cfg, secret) = match AuthConfig::from_env().and_then(|c| Ok((c, signing_secret_from_env()?))) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Invalid configuration: {e:#}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    info!("Bootstrapping passcode auth server");
    info!(
        otp_length = cfg.otp_length,
        otp_ttl_min = cfg.otp_ttl.num_minutes(),
        rate_limit = cfg.rate_limit_count,
        rate_window_s = cfg.rate_limit_window.as_secs(),
        session_ttl_min = cfg.session_ttl.num_minutes(),
        "configuration loaded"
    );

    let repo = build_repo().await?;
    let limiter = InMemoryRateLimiter::new(cfg.rate_limit_count, cfg.rate_limit_window);
    let sessions = SessionIssuer::new(secret.as_bytes(), cfg.session_ttl);
    let auth = Arc::new(AuthService::new(repo, Arc::new(limiter.clone()), notifier_from_env(), sessions, cfg.clone()));

    // lapsed counters are harmless but would otherwise accumulate
    let sweep = limiter.clone();
    let sweep_every = cfg.rate_limit_window.max(Duration::from_secs(60));
    actix_web::rt::spawn(async move {
        let mut tick = actix_web::rt::time::interval(sweep_every);
        loop {
            tick.tick().await;
            sweep.purge_expired(chrono::Utc::now());
        }
    });

    let openapi = ApiDoc::openapi();
    let state = AppState { auth };
    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind)?;

    info!("Listening on http://{bind}");

    server.run().await
}

#[cfg(not(feature = "postgres-store"))]
async fn build_repo() -> std::io::Result<Arc<dyn AuthRepo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(otpauth::repo::inmem::InMemRepo::new()))
}

#[cfg(feature = "postgres-store")]
async fn build_repo() -> std::io::Result<Arc<dyn AuthRepo>> {
    use sqlx::postgres::PgPoolOptions;
    let db_url = std::env::var("DATABASE_URL")
        .map_err(|_| std::io::Error::other("DATABASE_URL must be set for postgres-store"))?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&db_url)
        .await
        .map_err(std::io::Error::other)?;
    sqlx::migrate!("./migrations").run(&pool).await.map_err(std::io::Error::other)?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(otpauth::repo::pg::PgRepo::new(pool)))
}
