use crate::config::ApiConfig;
use crate::error::PipelineError;
use crate::listing::{ListingService, Pagination};
use crate::pipeline::{IngestionPipeline, UploadedFile};
use crate::record_store::{ImageRecord, ImageStatus};
use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use uuid::Uuid;

const DEFAULT_USER: &str = "demo-user";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub listing: Arc<ListingService>,
    pub max_upload_files: usize,
    pub max_file_size_bytes: usize,
    pub url_expiry_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
}

fn map_pipeline_error(err: PipelineError) -> ApiError {
    if err.is_not_found() {
        return error_response(StatusCode::NOT_FOUND, "Image not found or unauthorized");
    }

    error!(error = %err, "Request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub data: ImageRecord,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Serialize)]
pub struct MultiUploadResponse {
    pub success: bool,
    pub data: Vec<ImageRecord>,
    pub summary: UploadSummary,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub data: Vec<ImageRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlData {
    pub url: String,
    pub expires_in: String,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub success: bool,
    pub data: UrlData,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let body_limit = state.max_file_size_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/images/upload", post(upload_image))
        .route("/api/images/upload/multiple", post(upload_multiple_images))
        .route("/api/images/url/:image_id", get(get_image_url))
        // GET captures a user id, DELETE an image id; axum requires one
        // registration for a shared path
        .route("/api/images/:id", get(list_images).delete(delete_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "portrait-ingest"
    }))
}

/// One part pulled out of a multipart request
struct MultipartUpload {
    files: Vec<UploadedFile>,
    user_id: String,
}

/// Collect upload fields from a multipart body. `file_field` is the form
/// field name carrying image bytes ("image" or "images").
async fn read_multipart(mut multipart: Multipart, file_field: &str) -> Result<MultipartUpload> {
    let mut files = Vec::new();
    let mut user_id = DEFAULT_USER.to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .context("Malformed multipart body")?
    {
        match field.name() {
            Some(name) if name == file_field => {
                let original_name = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .context("Failed to read upload body")?;

                files.push(UploadedFile {
                    bytes: bytes.to_vec(),
                    original_name,
                    mime_type,
                });
            }
            Some("userId") => {
                if let Ok(value) = field.text().await {
                    if !value.is_empty() {
                        user_id = value;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(MultipartUpload { files, user_id })
}

/// Upload a single image
#[instrument(skip(state, multipart))]
async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload = read_multipart(multipart, "image")
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let Some(file) = upload.files.pop() else {
        return Err(error_response(StatusCode::BAD_REQUEST, "No file uploaded"));
    };

    let record = state
        .pipeline
        .process_upload(file, &upload.user_id)
        .await
        .map_err(map_pipeline_error)?;

    let message = match record.status {
        ImageStatus::Accepted => "Image uploaded successfully".to_string(),
        _ => format!(
            "Image rejected: {}",
            record.rejection_reason.as_deref().unwrap_or("unknown")
        ),
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            data: record,
            message,
        }),
    ))
}

/// Upload multiple images. Files are processed strictly in order, one full
/// pipeline run at a time.
#[instrument(skip(state, multipart))]
async fn upload_multiple_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_multipart(multipart, "images")
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    if upload.files.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "No files uploaded"));
    }

    if upload.files.len() > state.max_upload_files {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Too many files (maximum {})", state.max_upload_files),
        ));
    }

    let mut results = Vec::with_capacity(upload.files.len());
    for file in upload.files {
        let record = state
            .pipeline
            .process_upload(file, &upload.user_id)
            .await
            .map_err(map_pipeline_error)?;
        results.push(record);
    }

    let accepted = results
        .iter()
        .filter(|r| r.status == ImageStatus::Accepted)
        .count();
    let rejected = results.len() - accepted;

    info!(total = results.len(), accepted, rejected, "Batch upload completed");

    let message = format!(
        "Uploaded {} images: {} accepted, {} rejected",
        results.len(),
        accepted,
        rejected
    );

    Ok((
        StatusCode::CREATED,
        Json(MultiUploadResponse {
            success: true,
            summary: UploadSummary {
                total: results.len(),
                accepted,
                rejected,
            },
            data: results,
            message,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

/// List a user's images with optional status filter and pagination
#[instrument(skip(state))]
async fn list_images(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<ImageStatus>().map_err(|e| {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        })?),
    };

    let page = state
        .listing
        .list(&user_id, status, params.page, params.limit)
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(ListResponse {
        success: true,
        data: page.images,
        pagination: page.pagination,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: Option<String>,
}

/// Get a fresh signed URL for an image
#[instrument(skip(state))]
async fn get_image_url(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Query(params): Query<UserQuery>,
) -> Result<Json<UrlResponse>, ApiError> {
    let user_id = params.user_id.unwrap_or_else(|| DEFAULT_USER.to_string());

    let signed = state
        .listing
        .get_url(image_id, &user_id)
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(UrlResponse {
        success: true,
        data: UrlData {
            url: signed.url,
            expires_in: format_expiry(state.url_expiry_secs),
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody {
    user_id: Option<String>,
}

/// Delete an image
#[instrument(skip(state, body))]
async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Json(body): Json<DeleteBody>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let user_id = body.user_id.unwrap_or_else(|| DEFAULT_USER.to_string());

    state
        .listing
        .delete(image_id, &user_id)
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "Image deleted successfully".to_string(),
    }))
}

/// Human-readable expiry window, e.g. "24 hours"
fn format_expiry(secs: u64) -> String {
    if secs % 3600 == 0 && secs >= 3600 {
        format!("{} hours", secs / 3600)
    } else {
        format!("{secs} seconds")
    }
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting ingest API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_expiry() {
        assert_eq!(format_expiry(86400), "24 hours");
        assert_eq!(format_expiry(3600), "1 hours");
        assert_eq!(format_expiry(90), "90 seconds");
    }
}
