//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{PgCatalog, PgEnrollment, PgStore},
    config::Config,
    error::ApiError,
    web::{
        activity_handler, bulk_progress_handler, check_access_handler, course_summary_handler,
        lock_status_handler, resolve_actor, rest::ApiDoc, state::AppState, submit_quiz_handler,
        submit_watch_handler,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Engine & Shared AppState ---
    let catalog = Arc::new(PgCatalog::new(db_pool.clone()));
    let enrollment = Arc::new(PgEnrollment::new(db_pool.clone()));
    let engine = lms_progress_core::ProgressEngine::new(
        store,
        catalog,
        Some(enrollment),
        config.completion_policy(),
    );
    let app_state = Arc::new(AppState {
        engine,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let api_router = Router::new()
        .route("/progress/watch", post(submit_watch_handler))
        .route("/progress/quiz", post(submit_quiz_handler))
        .route("/progress/bulk", get(bulk_progress_handler))
        .route("/progress/activity", get(activity_handler))
        .route(
            "/courses/{course}/lessons/{lesson}/access",
            get(check_access_handler),
        )
        .route("/courses/{course}/lock-status", get(lock_status_handler))
        .route("/courses/{course}/summary", get(course_summary_handler))
        .layer(axum_middleware::from_fn(resolve_actor))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
