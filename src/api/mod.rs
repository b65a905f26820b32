//! API Routes for modelkit
//!
//! This module combines all API routes into a single router.

mod export;
pub mod status;

use axum::Router;

use crate::AppState;

pub use export::ExportBody;

/// Build the complete API router.
///
/// Route structure:
/// - /api/export/* - Export package downloads
/// - /health, /status, /metrics - Health checks (public)
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health and status endpoints (public)
        .merge(status::routes())
        // Export package downloads
        .nest("/api/export", export::routes())
}
