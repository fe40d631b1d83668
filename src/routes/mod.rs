pub mod datasets;
pub mod health;
pub mod measurements;
pub mod sensors;
pub mod streaming;
pub mod types;

use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::common::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        measurements::batch_insert,
        measurements::delete_measurements,
        measurements::latest_measurements,
        measurements::latest_measurements_query,
        measurements::historical_measurements,
        measurements::historical_measurements_query,
        streaming::subscribe,
        streaming::subscribe_simple,
        streaming::subscribe_advanced,
        sensors::discover_sensors,
        sensors::verify_sensors,
        sensors::sensor_timeseries,
        sensors::batch_sensor_timeseries,
        datasets::create_dataset,
        datasets::get_dataset,
        datasets::add_types_to_dataset,
        datasets::remove_types_from_dataset,
        datasets::dataset_sensors,
        types::list_types,
        types::get_type,
    ),
    components(
        schemas(
            crate::entity::DataType,
            crate::filter::DiscoveryRequest,
            crate::filter::TimeseriesFilter,
            crate::filter::MeasurementFilter,
            crate::filter::TimeRange,
            crate::filter::VerifyRequest,
            crate::filter::VerifyResponse,
            crate::services::codec::MeasurementValue,
            crate::services::query::MeasurementRecord,
            crate::services::ingest::BatchDataRequest,
            crate::services::ingest::MeasurementInput,
            crate::services::ingest::ProvenanceInput,
            crate::services::ingest::DeleteMeasurementsRequest,
            crate::streaming::SubscribePayload,
            crate::streaming::MeasurementUpdate,
            measurements::LatestMeasurementsRequest,
            measurements::HistoricalMeasurementsRequest,
            measurements::DeleteOutcome,
            sensors::SensorTimeseriesResponse,
            sensors::TimeseriesInfo,
            sensors::BatchSensorTimeseriesRequest,
            datasets::CreateDatasetRequest,
            datasets::DatasetTypesRequest,
            datasets::DatasetResponse,
            datasets::TypeInDataset,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "measurements", description = "Ingestion and measurement queries"),
        (name = "streaming", description = "Live measurement subscriptions over WebSocket"),
        (name = "sensors", description = "Sensor discovery and verification"),
        (name = "datasets", description = "Dataset composition"),
        (name = "types", description = "Measurement type registry"),
    ),
    info(
        title = "Telemetry DB API",
        description = "Polymorphic time-series sensor API with filter-driven discovery and live streaming",
        version = "0.1.0"
    )
)]
struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let measurement_routes = Router::new()
        .route("/batch", post(measurements::batch_insert))
        .route("/", delete(measurements::delete_measurements))
        .route(
            "/latest",
            get(measurements::latest_measurements_query).post(measurements::latest_measurements),
        )
        .route(
            "/historical",
            get(measurements::historical_measurements_query)
                .post(measurements::historical_measurements),
        )
        .route("/subscribe", get(streaming::subscribe))
        .route("/subscribe/simple", get(streaming::subscribe_simple))
        .route("/subscribe/advanced", get(streaming::subscribe_advanced));

    let sensor_routes = Router::new()
        .route("/", post(sensors::discover_sensors))
        .route("/verify", post(sensors::verify_sensors))
        .route("/timeseries", post(sensors::batch_sensor_timeseries))
        .route("/{name}", get(sensors::sensor_timeseries));

    let dataset_routes = Router::new()
        .route("/", post(datasets::create_dataset))
        .route("/{name}", get(datasets::get_dataset))
        .route(
            "/{name}/types",
            post(datasets::add_types_to_dataset).delete(datasets::remove_types_from_dataset),
        )
        .route("/{name}/sensors", get(datasets::dataset_sensors));

    let type_routes = Router::new()
        .route("/", get(types::list_types))
        .route("/{name}", get(types::get_type));

    let api_routes = Router::new()
        .route("/health", get(health::health))
        .nest("/measurements", measurement_routes)
        .nest("/sensors", sensor_routes)
        .nest("/datasets", dataset_routes)
        .nest("/types", type_routes)
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1MB body limit

    // OpenAPI documentation
    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(docs_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_seconds,
        )))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
