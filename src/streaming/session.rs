//! WebSocket subscription sessions.
//!
//! Protocol (graphql-ws inspired): the client's first frame must be
//! `{"type":"connection_init","payload":{...}}`. The server validates the
//! payload against the endpoint's mode policy, answers
//! `{"type":"connection_ack","payload":{"mode":...}}` and then streams
//! `{"type":"data","payload":<update>}` frames. Any protocol violation is
//! answered with an `{"type":"error"}` frame and a close. Subsequent client
//! messages are ignored; a close from either side tears down every
//! partition task.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::AppState;
use crate::error::AppError;
use crate::filter::{MeasurementFilter, TimeseriesFilter};
use crate::services::spatial::{self, SpatialCondition};
use crate::services::{discovery, types_registry};
use crate::streaming::registry::SubscriptionHandle;
use crate::streaming::view::{self, MeasurementUpdate, SubscriptionSpec};

/// Which payload shapes an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModePolicy {
    Any,
    SimpleOnly,
    AdvancedOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    Simple,
    Advanced,
}

/// Payload of the `connection_init` frame.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SubscribePayload {
    /// Simple mode: stream these sensors (non-empty).
    #[serde(default)]
    pub sensor_names: Vec<String>,
    /// Simple mode: optionally restrict to these types.
    #[serde(default)]
    pub type_names: Vec<String>,
    /// Advanced mode: structural filter pushed into the cursor queries.
    #[serde(default)]
    pub timeseries_filter: Option<TimeseriesFilter>,
    /// Advanced mode: measurement-value filter; spatial conditions are
    /// evaluated at the application layer.
    #[serde(default)]
    pub measurement_filter: Option<MeasurementFilter>,
    /// Accepted for compatibility with the discovery request shape; a live
    /// stream is unbounded.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Skip delivery of the view's current contents at subscription start.
    #[serde(default)]
    pub skip_initial_snapshot: bool,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    payload: JsonValue,
}

/// Decide the subscription mode for a payload under an endpoint policy.
pub fn validate_mode(
    payload: &SubscribePayload,
    policy: ModePolicy,
) -> Result<SubscriptionMode, String> {
    let has_simple = !payload.sensor_names.is_empty();
    let has_advanced =
        payload.timeseries_filter.is_some() || payload.measurement_filter.is_some();

    match policy {
        ModePolicy::SimpleOnly => {
            if has_advanced {
                Err("this endpoint only accepts simple subscriptions (sensor_names)".to_string())
            } else if !has_simple {
                Err("sensor_names must not be empty".to_string())
            } else {
                Ok(SubscriptionMode::Simple)
            }
        }
        ModePolicy::AdvancedOnly => {
            if !has_advanced {
                Err("this endpoint requires timeseries_filter or measurement_filter".to_string())
            } else {
                Ok(SubscriptionMode::Advanced)
            }
        }
        ModePolicy::Any => {
            if has_advanced {
                Ok(SubscriptionMode::Advanced)
            } else if has_simple {
                Ok(SubscriptionMode::Simple)
            } else {
                Err("subscription payload must not be empty".to_string())
            }
        }
    }
}

/// Drive one accepted WebSocket connection.
pub async fn handle_socket(state: AppState, socket: WebSocket, policy: ModePolicy) {
    let (mut sink, mut stream) = socket.split();

    let payload = match read_init(&mut stream).await {
        Ok(payload) => payload,
        Err(message) => {
            send_error(&mut sink, &message).await;
            return;
        }
    };

    let mode = match validate_mode(&payload, policy) {
        Ok(mode) => mode,
        Err(message) => {
            send_error(&mut sink, &message).await;
            return;
        }
    };

    run_subscription(state, sink, stream, payload, mode).await;
}

/// Await the single initialization frame.
async fn read_init(stream: &mut SplitStream<WebSocket>) -> Result<SubscribePayload, String> {
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(_)) | None => return Err("connection closed before init".to_string()),
        };

        match message {
            Message::Text(text) => {
                let frame: ClientFrame = serde_json::from_str(text.as_str())
                    .map_err(|e| format!("invalid init frame: {e}"))?;
                if frame.frame_type != "connection_init" {
                    return Err(format!(
                        "expected connection_init, got '{}'",
                        frame.frame_type
                    ));
                }
                return serde_json::from_value(frame.payload)
                    .map_err(|e| format!("invalid subscription payload: {e}"));
            }
            Message::Close(_) => return Err("connection closed before init".to_string()),
            // Pings and pongs are handled by the transport.
            _ => {}
        }
    }
}

async fn run_subscription(
    state: AppState,
    mut sink: SplitSink<WebSocket, Message>,
    stream: SplitStream<WebSocket>,
    payload: SubscribePayload,
    mode: SubscriptionMode,
) {
    let (spec, spatial_filters, referenced_types) =
        match build_spec(&state, &payload, mode).await {
            Ok(parts) => parts,
            Err(e) => {
                send_error(&mut sink, &e.to_string()).await;
                return;
            }
        };

    let data_types = match types_registry::resolve_data_types(
        &state,
        referenced_types.iter().map(String::as_str),
    )
    .await
    {
        Ok(map) => map,
        Err(e) => {
            send_error(&mut sink, &e.to_string()).await;
            return;
        }
    };

    let id = Uuid::new_v4();
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<MeasurementUpdate>(view::UPDATE_CHANNEL_CAPACITY);

    if let Err(e) = view::spawn_partitions(&state, &spec, &data_types, &tx, &token) {
        send_error(&mut sink, &e.to_string()).await;
        token.cancel();
        return;
    }
    // Partitions hold their own senders; dropping ours lets the writer
    // observe a closed channel when every partition has exited.
    drop(tx);

    state.registry.register(SubscriptionHandle {
        id,
        token: token.clone(),
    });
    tracing::info!(
        subscription = %id,
        mode = ?mode,
        sensors = spec.sensor_names.len(),
        types = spec.type_names.len(),
        conditions = spec.conditions.len(),
        spatial = spatial_filters.len(),
        "Subscription opened"
    );

    let ack = json!({"type": "connection_ack", "payload": {"mode": mode}});
    if sink.send(Message::Text(ack.to_string().into())).await.is_err() {
        token.cancel();
        state.registry.remove(id);
        return;
    }

    let writer = tokio::spawn(writer_loop(sink, rx, spatial_filters, token.clone()));
    let reader = tokio::spawn(reader_loop(stream, token.clone()));

    token.cancelled().await;
    state.registry.remove(id);
    let _ = writer.await;
    let _ = reader.await;

    tracing::info!(subscription = %id, "Subscription closed");
}

/// Turn the validated payload into cursor pushdowns plus spatial post-filters.
async fn build_spec(
    state: &AppState,
    payload: &SubscribePayload,
    mode: SubscriptionMode,
) -> Result<(SubscriptionSpec, Vec<SpatialCondition>, Vec<String>), AppError> {
    let conditions =
        discovery::lowered_conditions(payload.measurement_filter.as_ref())?;
    let (pushdown, spatial_filters) = spatial::split_spatial(conditions);

    let mut type_constraint: Vec<String> = Vec::new();
    let mut referenced: Vec<String> = Vec::new();

    fn note(list: &mut Vec<String>, name: &str) {
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
    }

    match mode {
        SubscriptionMode::Simple => {
            for name in &payload.type_names {
                note(&mut type_constraint, name);
            }
        }
        SubscriptionMode::Advanced => {
            if let Some(tf) = &payload.timeseries_filter {
                for name in tf.required_types.iter().chain(&tf.optional_types) {
                    note(&mut type_constraint, name);
                }
                if !tf.dataset_names.is_empty() {
                    for name in view::dataset_type_names(state, &tf.dataset_names).await? {
                        note(&mut type_constraint, &name);
                    }
                }
            }
        }
    }

    for name in &type_constraint {
        note(&mut referenced, name);
    }
    for condition in &pushdown {
        note(&mut referenced, &condition.type_name);
    }
    for filter in &spatial_filters {
        note(&mut referenced, &filter.type_name);
    }

    let spec = SubscriptionSpec {
        sensor_names: match mode {
            SubscriptionMode::Simple => payload.sensor_names.clone(),
            SubscriptionMode::Advanced => Vec::new(),
        },
        type_names: type_constraint,
        conditions: pushdown,
        time_range: payload
            .measurement_filter
            .as_ref()
            .and_then(|mf| mf.time_range.clone()),
        skip_initial_snapshot: payload.skip_initial_snapshot,
    };

    Ok((spec, spatial_filters, referenced))
}

/// Drain the update channel into the socket, applying spatial post-filters.
async fn writer_loop(
    mut sink: SplitSink<WebSocket, Message>,
    rx: mpsc::Receiver<MeasurementUpdate>,
    spatial_filters: Vec<SpatialCondition>,
    token: CancellationToken,
) {
    let mut updates = ReceiverStream::new(rx);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            received = updates.next() => match received {
                Some(update) => {
                    if !spatial::passes(
                        update.data_type,
                        &update.type_name,
                        &update.value,
                        &spatial_filters,
                    ) {
                        continue;
                    }
                    let frame = json!({"type": "data", "payload": update});
                    if sink
                        .send(Message::Text(frame.to_string().into()))
                        .await
                        .is_err()
                    {
                        token.cancel();
                        break;
                    }
                }
                None => {
                    token.cancel();
                    break;
                }
            },
        }
    }
    let _ = sink.close().await;
}

/// Read the socket only to detect close; subsequent messages are ignored.
async fn reader_loop(mut stream: SplitStream<WebSocket>, token: CancellationToken) {
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    token.cancel();
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_error(sink: &mut SplitSink<WebSocket, Message>, message: &str) {
    let frame = json!({"type": "error", "payload": {"message": message}});
    let _ = sink.send(Message::Text(frame.to_string().into())).await;
    let _ = sink.close().await;
}
