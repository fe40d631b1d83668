use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::streaming::session::{self, ModePolicy};

/// Subscribe to live measurement updates (any mode)
///
/// After the upgrade the client must send a single
/// `{"type":"connection_init","payload":{...}}` frame; the payload decides
/// between simple (`sensor_names`) and advanced
/// (`timeseries_filter`/`measurement_filter`) mode.
#[utoipa::path(
    get,
    path = "/api/v1/measurements/subscribe",
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 503, description = "Streaming source not configured"),
    ),
    tag = "streaming"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    upgrade(state, ws, ModePolicy::Any)
}

/// Subscribe to live measurement updates (simple mode only)
#[utoipa::path(
    get,
    path = "/api/v1/measurements/subscribe/simple",
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 503, description = "Streaming source not configured"),
    ),
    tag = "streaming"
)]
pub async fn subscribe_simple(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    upgrade(state, ws, ModePolicy::SimpleOnly)
}

/// Subscribe to live measurement updates (advanced mode only)
#[utoipa::path(
    get,
    path = "/api/v1/measurements/subscribe/advanced",
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 503, description = "Streaming source not configured"),
    ),
    tag = "streaming"
)]
pub async fn subscribe_advanced(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    upgrade(state, ws, ModePolicy::AdvancedOnly)
}

fn upgrade(state: AppState, ws: WebSocketUpgrade, policy: ModePolicy) -> AppResult<Response> {
    if state.streaming_db.is_none() {
        return Err(AppError::ServiceUnavailable(
            "streaming source not configured".to_string(),
        ));
    }

    Ok(ws.on_upgrade(move |socket| session::handle_socket(state, socket, policy)))
}
