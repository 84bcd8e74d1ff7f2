//! HTTP request handlers.

/// Note browsing, upload, download and rating endpoints.
pub mod notes;
/// Account, session and dashboard endpoints.
pub mod users;

use serde_json::json;

fn success() -> axum::Json<serde_json::Value> {
    axum::Json(json!({ "success": true }))
}
