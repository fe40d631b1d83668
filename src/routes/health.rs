use axum::http::StatusCode;

/// Health check endpoint
///
/// Returns 200 OK if the service is running.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "health"
)]
pub async fn health() -> StatusCode {
    StatusCode::OK
}
