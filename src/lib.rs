//! Vidz Backend - library for app logic and testing

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod ranking;
pub mod routes;
pub mod state;
pub mod video;
pub mod vote;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::config::{AppConfig, LogConfig};
use crate::db::{MemoryStore, PgStore, Store};
use crate::state::AppState;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// CORS for the configured front-end origins. Origins that are not valid
/// header values are skipped with a warning.
pub fn configure_cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors(&state.config.allowed_origins);

    Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/verify", post(routes::auth::verify_token))
        .route("/auth/logout", post(routes::auth::logout))
        .route(
            "/posts",
            get(routes::posts::list_posts).post(routes::posts::create_post),
        )
        .route(
            "/posts/{id}",
            get(routes::posts::get_post)
                .put(routes::posts::update_post)
                .delete(routes::posts::delete_post),
        )
        .route("/collection", get(routes::posts::list_collection))
        .route("/tags", get(routes::tags::list_tags))
        .route(
            "/favorites/{user_id}",
            get(routes::favorites::list_favorites).post(routes::favorites::add_favorite),
        )
        .route(
            "/favorites/{user_id}/{post_id}",
            axum::routing::delete(routes::favorites::remove_favorite),
        )
        .route(
            "/vote",
            post(routes::votes::cast_vote).delete(routes::votes::retract_vote),
        )
        .route("/vote/{user_id}", get(routes::votes::user_votes))
        .route("/vote/post/{post_id}", get(routes::votes::post_score))
        .route("/health", get(routes::health::health_ping))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // 1 MB is plenty for JSON bodies
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(cors)
}

/// Opens the Postgres store when a database is configured, otherwise the
/// in-memory store.
pub async fn build_state(config: AppConfig) -> Result<AppState, BoxError> {
    let store: Arc<dyn Store> = match &config.database {
        Some(db_config) => {
            let pool = db::init_pool(db_config).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Using Postgres store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set. Data is kept in memory and lost on restart.");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(AppState::new(store, config))
}

/// Run the server (used by main).
pub async fn run() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init(&LogConfig::from_env());

    // Parsed after the subscriber is up so fallback warnings are not lost.
    let config = AppConfig::from_env();

    routes::health::init_start_time();

    config.validate()?;
    let addr = config.bind_addr()?;
    tracing::info!(environment = %config.environment, "Configuration loaded");

    let state = build_state(config).await?;
    let app = create_app(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
