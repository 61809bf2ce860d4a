//! OpenAPI specification generation for the beacon-logger API.
//!
//! Served at `/api/openapi.json` and written to disk by `gen-openapi`.

use axum::Json;
use beacon_core::{MonitoringState, Region};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::monitoring::MonitoringStatusResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beacon-logger API",
        version = "0.1.0",
        description = r"
# beacon-logger API

Control surface of a host that watches one iBeacon region and logs the
closest beacons to a CSV session file.

## Lifecycle

1. **activate** opens a new session file (`DD_MM_YYYY HH_MM.csv`) and
   registers the region with the radio.
2. While a beacon of the region is in range, each ranging cycle appends
   one row with up to four beacons, closest first.
3. **deactivate** stops the radio and closes the file.

Session rows are only ever written to the session file; this API reports
the state of the pipeline but does not serve log content.
",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beacon-logger server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "monitoring", description = "Region monitoring and session lifecycle")
    ),
    paths(
        super::health::health_check,
        super::monitoring::get_status,
        super::monitoring::activate,
        super::monitoring::deactivate,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            MonitoringStatusResponse,
            MonitoringState,
            Region,
        )
    )
)]
pub struct ApiDoc;
