use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod config;
mod extract;
mod models;
mod openai;
mod pipeline;
mod signal;
mod upload;
mod worker;

use config::Config;
use models::ProcessMenuResponse;
use openai::OpenAiClient;
use pipeline::{MenuProcessor, Outcome};
use upload::{ImageKind, StagedUpload, UploadError};
use worker::WorkerPool;

const SERVICE_NAME: &str = "Menu Analyzer API";
const PROCESS_MENU_PATH: &str = "/api/process-menu";
const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    processor: MenuProcessor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!("creating upload directory {}", config.upload_dir.display())
    })?;

    let extractor = OpenAiClient::new(config.extraction.clone(), config.request_timeout)?;
    let images = OpenAiClient::new(config.image.clone(), config.request_timeout)?;
    tracing::info!(
        backend = ?config.backend,
        extraction_model = extractor.model(),
        image_model = images.model(),
        workers = config.worker_pool_size,
        "model clients ready"
    );

    let processor = MenuProcessor::new(
        Arc::new(extractor),
        Arc::new(images),
        WorkerPool::new(config.worker_pool_size),
        config.cancel_grace,
    );
    let bind_addr = config.bind_addr;
    let app = router(AppState {
        config: Arc::new(config),
        processor,
    });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(PROCESS_MENU_PATH, post(process_menu_endpoint))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {"process_menu": PROCESS_MENU_PATH, "health": "/health"},
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn process_menu_endpoint(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_upload(multipart, &state.config.upload_dir).await {
        Ok(upload) => upload,
        Err(e) => {
            let status = match e {
                UploadError::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
                UploadError::Multipart { status, .. } => {
                    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST)
                }
                _ => StatusCode::BAD_REQUEST,
            };
            return (status, Json(json!({"detail": e.to_string()}))).into_response();
        }
    };

    // The server drops this future when the client goes away, which drops
    // `_connection` and stops the pipeline running on its own task.
    let (_connection, disconnect) = signal::stop_channel();
    let processor = state.processor.clone();
    let job = tokio::spawn(async move { processor.process(upload, disconnect).await });

    match job.await {
        Ok(Ok(Outcome::Completed(menu))) => {
            let response = ProcessMenuResponse {
                success: true,
                data: menu,
                message: "Menu analyzed successfully".to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Ok(Outcome::Disconnected)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => processing_error(e),
        Err(e) => processing_error(e),
    }
}

fn processing_error(e: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": format!("Error while processing the menu: {}", e)})),
    )
        .into_response()
}

/// Keeps axum's status (413 for an oversized body) alongside its message.
fn multipart_error(e: MultipartError) -> UploadError {
    UploadError::Multipart {
        status: e.status().as_u16(),
        message: e.body_text(),
    }
}

/// Pull the `file` field out of the form, check its declared type and stage
/// it on disk. Nothing is written for a rejected upload.
async fn read_upload(mut multipart: Multipart, dir: &Path) -> Result<StagedUpload, UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let kind = ImageKind::from_content_type(field.content_type())?;
        let bytes = field
            .bytes()
            .await
            .map_err(multipart_error)?;

        let dir = dir.to_path_buf();
        return tokio::task::spawn_blocking(move || StagedUpload::stage(&dir, kind, &bytes))
            .await
            .map_err(|e| UploadError::Staging(std::io::Error::other(e)))?;
    }
    Err(UploadError::MissingFile)
}
