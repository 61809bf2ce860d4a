//! Monitoring control endpoints.
//!
//! The only way to start or stop a logging session from outside the
//! process. Every handler goes through the monitor lock, the same one the
//! event pump holds while writing a row.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::{Monitor, MonitoringState, Region};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::{DynScanner, SharedState};

/// Current state of the monitoring pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "state": "ranging",
    "active": true,
    "region": {
        "name": "myBeacon",
        "proximity_uuid": "20cae8a0-a9cf-11e3-a5e2-0800200c9a66",
        "major": null,
        "minor": null
    },
    "device_identity": "raspberrypi",
    "session_file": "/home/pi/Downloads/beacon/18_10_2026 08_00.csv",
    "records_written": 42,
    "checked_at_utc": "2026-10-18T08:01:24Z"
}))]
pub struct MonitoringStatusResponse {
    /// Lifecycle state.
    pub state: MonitoringState,

    /// Whether a session is open.
    #[schema(example = true)]
    pub active: bool,

    /// The monitored region.
    pub region: Region,

    /// Value written to the PHONE column of this session.
    #[schema(example = "raspberrypi")]
    pub device_identity: String,

    /// Path of the open session file.
    #[schema(nullable)]
    pub session_file: Option<String>,

    /// Rows appended to the open session.
    #[schema(example = 42)]
    pub records_written: u64,

    /// UTC timestamp of this snapshot.
    #[schema(example = "2026-10-18T08:01:24Z")]
    pub checked_at_utc: String,
}

impl MonitoringStatusResponse {
    fn of(monitor: &Monitor<DynScanner>) -> Self {
        Self {
            state: monitor.state(),
            active: monitor.state().is_active(),
            region: monitor.region().clone(),
            device_identity: monitor.device_identity().to_string(),
            session_file: monitor.session_path().map(|p| p.display().to_string()),
            records_written: monitor.records_written(),
            checked_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Creates the monitoring router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_status))
        .route("/activate", post(activate))
        .route("/deactivate", post(deactivate))
}

/// Get monitoring status.
#[utoipa::path(
    get,
    path = "/api/monitoring",
    tag = "monitoring",
    operation_id = "getMonitoringStatus",
    summary = "Get monitoring status",
    description = "Returns the lifecycle state, the monitored region and the \
        open session file, if any.",
    responses(
        (status = 200, description = "Status retrieved", body = MonitoringStatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<MonitoringStatusResponse> {
    let monitor = state.monitor.lock().await;
    Json(MonitoringStatusResponse::of(&monitor))
}

/// Activate monitoring.
#[utoipa::path(
    post,
    path = "/api/monitoring/activate",
    tag = "monitoring",
    operation_id = "activateMonitoring",
    summary = "Activate monitoring",
    description = "Opens a new session file and registers the region with the \
        radio. Does nothing if monitoring is already active.",
    responses(
        (status = 200, description = "Monitoring active", body = MonitoringStatusResponse),
        (status = 503, description = "Session storage or radio unavailable", body = ErrorResponse)
    )
)]
pub async fn activate(State(state): State<SharedState>) -> ApiResult<Json<MonitoringStatusResponse>> {
    let mut monitor = state.monitor.lock().await;

    monitor.activate().map_err(|e| {
        warn!(error = %e, code = e.error_code(), "Activation rejected");
        ApiError::from(e)
    })?;

    info!(session = ?monitor.session_path(), "Monitoring activated via API");
    Ok(Json(MonitoringStatusResponse::of(&monitor)))
}

/// Deactivate monitoring.
#[utoipa::path(
    post,
    path = "/api/monitoring/deactivate",
    tag = "monitoring",
    operation_id = "deactivateMonitoring",
    summary = "Deactivate monitoring",
    description = "Stops ranging, unregisters the region and closes the session \
        file. The monitor is idle afterwards even when a radio command fails; \
        that failure is reported as 503.",
    responses(
        (status = 200, description = "Monitoring stopped", body = MonitoringStatusResponse),
        (status = 503, description = "Radio command failed, monitor is idle", body = ErrorResponse)
    )
)]
pub async fn deactivate(
    State(state): State<SharedState>,
) -> ApiResult<Json<MonitoringStatusResponse>> {
    let mut monitor = state.monitor.lock().await;

    if let Err(e) = monitor.deactivate() {
        warn!(error = %e, "Deactivated with radio errors");
        return Err(ApiError::ServiceUnavailable {
            error_code: e.error_code().to_string(),
            message: e.to_string(),
            details: Some("monitoring is idle and the session file is closed".to_string()),
        });
    }

    info!("Monitoring deactivated via API");
    Ok(Json(MonitoringStatusResponse::of(&monitor)))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::api::create_router;
    use crate::state::AppState;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use beacon_core::{Config, MockScanner, ScannerCommand, HEADER};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        scanner: MockScanner,
        server: TestServer,
    }

    fn harness_in(dir: TempDir, log_dir: &Path) -> Harness {
        let mut config = Config::default();
        config.logging.directory = log_dir.to_path_buf();
        config.device.identity = Some("bench".to_string());

        let scanner = MockScanner::new();
        let state = AppState::new(config, Box::new(scanner.clone())).into_shared();
        let server = tokio_test::assert_ok!(TestServer::new(create_router(state)));

        Harness {
            _dir: dir,
            scanner,
            server,
        }
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("beacon");
        harness_in(dir, &log_dir)
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let h = harness();

        let response = h.server.get("/api/monitoring").await;
        response.assert_status_ok();

        let status: MonitoringStatusResponse = response.json();
        assert_eq!(status.state, MonitoringState::Idle);
        assert!(!status.active);
        assert_eq!(status.region.name, "myBeacon");
        assert!(status.session_file.is_none());
        assert_eq!(status.records_written, 0);
    }

    #[tokio::test]
    async fn test_activate_opens_session_file() {
        let h = harness();

        let response = h.server.post("/api/monitoring/activate").await;
        response.assert_status_ok();

        let status: MonitoringStatusResponse = response.json();
        assert_eq!(status.state, MonitoringState::Monitoring);
        assert_eq!(status.device_identity, "bench");

        let path = status.session_file.expect("session file");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{HEADER}\n"));
        assert_eq!(h.scanner.commands(), vec![ScannerCommand::StartMonitoring]);
    }

    #[tokio::test]
    async fn test_activate_twice_keeps_session() {
        let h = harness();

        let first: MonitoringStatusResponse =
            h.server.post("/api/monitoring/activate").await.json();
        let second: MonitoringStatusResponse =
            h.server.post("/api/monitoring/activate").await.json();

        assert_eq!(first.session_file, second.session_file);
        assert_eq!(h.scanner.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_closes_session() {
        let h = harness();
        h.server.post("/api/monitoring/activate").await.assert_status_ok();

        let response = h.server.post("/api/monitoring/deactivate").await;
        response.assert_status_ok();

        let status: MonitoringStatusResponse = response.json();
        assert_eq!(status.state, MonitoringState::Idle);
        assert!(status.session_file.is_none());
        assert_eq!(
            h.scanner.commands(),
            vec![ScannerCommand::StartMonitoring, ScannerCommand::StopMonitoring]
        );
    }

    #[tokio::test]
    async fn test_activate_reports_unavailable_storage() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"").unwrap();
        let h = harness_in(dir, &blocker.join("beacon"));

        let response = h.server.post("/api/monitoring/activate").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        let body: ErrorResponse = response.json();
        assert_eq!(body.error, "STORAGE_UNAVAILABLE");
        assert!(h.scanner.commands().is_empty());

        let status: MonitoringStatusResponse = h.server.get("/api/monitoring").await.json();
        assert_eq!(status.state, MonitoringState::Idle);
    }

    #[tokio::test]
    async fn test_activate_reports_radio_failure() {
        let h = harness();
        h.scanner.fail(ScannerCommand::StartMonitoring);

        let response = h.server.post("/api/monitoring/activate").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        let body: ErrorResponse = response.json();
        assert_eq!(body.error, "RADIO_COMMUNICATION_ERROR");

        let status: MonitoringStatusResponse = h.server.get("/api/monitoring").await.json();
        assert!(!status.active);
    }

    #[tokio::test]
    async fn test_deactivate_radio_failure_still_goes_idle() {
        let h = harness();
        h.server.post("/api/monitoring/activate").await.assert_status_ok();
        h.scanner.fail(ScannerCommand::StopMonitoring);

        let response = h.server.post("/api/monitoring/deactivate").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorResponse = response.json();
        assert!(body.details.is_some());

        let status: MonitoringStatusResponse = h.server.get("/api/monitoring").await.json();
        assert_eq!(status.state, MonitoringState::Idle);
        assert!(status.session_file.is_none());
    }
}
