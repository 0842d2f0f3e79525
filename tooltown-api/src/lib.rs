//! # tooltown-api
//!
//! HTTP front end for the Tooltown document utilities.
//!
//! Routes are grouped by domain: `/pdf` for document operations, `/image`,
//! `/file` and `/text` for the small utilities. Upload endpoints take a
//! multipart form and share one pipeline (stage, validate, execute, respond)
//! parameterized by the requested operation.
//!
//! ```rust,no_run
//! use tooltown_api::{app, AppConfig};
//!
//! # async fn serve() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//! axum::serve(listener, app(config)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod params;
pub mod pipeline;
pub mod response;
pub mod state;
pub mod upload;

pub use config::{AppConfig, Args};
pub use error::{AppError, ErrorResponse};
pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use handlers::{pdf, tools};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries, part headers and JSON text parts.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

fn pdf_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(pdf::health))
        .route("/merge", post(pdf::merge))
        .route("/split", post(pdf::split))
        .route("/rotate", post(pdf::rotate))
        .route("/extract-text", post(pdf::extract_text))
        .route("/extract-images", post(pdf::extract_images))
        .route("/images-to-pdf", post(pdf::images_to_pdf))
        .route("/watermark", post(pdf::watermark))
        .route("/encrypt", post(pdf::encrypt))
        .route("/decrypt", post(pdf::decrypt))
        .route("/extract-form", post(pdf::extract_form))
        .route("/fill-form", post(pdf::fill_form))
        .route("/set-metadata", post(pdf::set_metadata))
        .route("/metadata", post(pdf::read_metadata))
        .route("/set-viewer-prefs", post(pdf::set_viewer_prefs))
        .route("/extract-outline", post(pdf::extract_outline))
        .route("/add-bookmarks", post(pdf::add_bookmarks))
        .route("/create-toc", post(pdf::create_toc))
        .route("/add-page-labels", post(pdf::add_page_labels))
        .route("/optimize", post(pdf::optimize))
        .route("/compress", post(pdf::compress))
        .route("/validate", post(pdf::validate))
}

/// Builds the application router around `config`.
pub fn app(config: AppConfig) -> Router {
    let body_limit = config
        .storage
        .max_upload_bytes
        .saturating_mul(config.limits.max_files as u64)
        .saturating_add(FORM_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let state = AppState::new(config);

    Router::new()
        .nest("/pdf", pdf_routes())
        .route("/image/size", post(tools::image_size))
        .route("/image/grayscale", post(tools::grayscale))
        .route("/file/size", post(tools::file_size))
        .route("/file/extension", post(tools::file_extension))
        .route("/text/word-count", post(tools::word_count))
        .route("/text/char-count", post(tools::char_count))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
