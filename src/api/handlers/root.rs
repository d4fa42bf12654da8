use axum::{http::StatusCode, response::IntoResponse};

/// Undocumented landing route; answers probes without touching any state.
pub async fn root() -> impl IntoResponse {
    StatusCode::OK
}
