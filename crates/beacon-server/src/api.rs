//! HTTP API routes and handlers.
//!
//! - `health` - Service health checks
//! - `monitoring` - Monitoring status and session lifecycle
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod monitoring;
pub mod openapi;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// ```text
/// /health                      - Health check
/// /api
/// ├── /monitoring              - Status
/// │   ├── /activate            - Open a session and start monitoring
/// │   └── /deactivate          - Stop monitoring and close the session
/// └── /openapi.json            - OpenAPI specification
/// /swagger-ui                  - Interactive documentation
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/monitoring", monitoring::router()),
        )
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/swagger-ui/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
