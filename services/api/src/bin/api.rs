//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FfmpegThumbnailAdapter, FfprobeAdapter},
    config::Config,
    error::ApiError,
    web::{
        create_video_handler, get_thumbnail_handler, get_video_handler, list_videos_handler,
        middleware::USER_ID_HEADER, require_user, required_watch_time_handler, rest::ApiDoc,
        state::AppState, still_watching_handler, stream_video_handler, update_video_handler,
        upload_video_handler,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
        HeaderName, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use streamfox_core::{
    MediaStore, SystemClock, TimeOrderedIds, UploadPipeline, VideoCatalog, WatchIntegrityEngine,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
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
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Media Storage and Tooling ---
    tokio::fs::create_dir_all(&config.data_root).await?;
    let store = MediaStore::new(config.data_root.clone());
    let probe = Arc::new(FfprobeAdapter::new(config.ffprobe_path.clone()));
    let thumbnails = Arc::new(FfmpegThumbnailAdapter::new(config.ffmpeg_path.clone()));
    let clock = Arc::new(SystemClock);
    let ids = Arc::new(TimeOrderedIds);
    info!(
        "Storing media under {} ({} concurrent jobs, {}s per step)",
        config.data_root.display(),
        config.processing_limits.max_concurrent,
        config.processing_limits.step_timeout.as_secs()
    );

    // --- 4. Build the Core Services and the Shared AppState ---
    let pipeline = Arc::new(UploadPipeline::new(
        db_adapter.clone(),
        store,
        probe,
        thumbnails,
        ids.clone(),
        clock.clone(),
        config.processing_limits,
    ));
    let catalog = Arc::new(VideoCatalog::new(db_adapter.clone(), db_adapter.clone()));
    let watch = Arc::new(WatchIntegrityEngine::new(
        db_adapter.clone(),
        db_adapter.clone(),
        ids,
        clock,
        config.watch_policy,
    ));

    let app_state = Arc::new(AppState {
        users: db_adapter,
        catalog,
        pipeline,
        watch,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            RANGE,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .expose_headers([CONTENT_RANGE, ACCEPT_RANGES, CONTENT_LENGTH]);

    // --- 5. Create the Web Router ---
    // Media uploads stream straight to disk and get their own, larger limit.
    let upload_routes = Router::new()
        .route("/videos/{id}/video", put(upload_video_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    let video_routes = Router::new()
        .route("/videos", post(create_video_handler).get(list_videos_handler))
        .route("/videos/{id}", get(get_video_handler).put(update_video_handler))
        .route("/videos/{id}/thumbnail", get(get_thumbnail_handler))
        .route("/videos/{id}/stream", get(stream_video_handler))
        .route("/videos/{id}/watch-time", get(required_watch_time_handler))
        .route("/videos/{id}/still-watching", post(still_watching_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024));

    let api_router = Router::new()
        .merge(video_routes)
        .merge(upload_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_user,
        ))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections...");
}
