pub mod auth;
pub mod bigquery;
pub mod config;
pub mod error;
pub mod gcp;
pub mod github;
pub mod guardrails;
pub mod handlers;
pub mod mcp;
pub mod rate_limit;
pub mod state;
pub mod tools;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use rate_limit::{ClientIpKeyExtractor, RateLimit};
use state::AppState;

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Read-only MCP gateway",
        description = "MCP server exposing read-only GitHub or BigQuery tools over SSE, gated by static bearer tokens."
    ),
    paths(
        handlers::root,
        handlers::healthz,
        mcp::sse_handler,
        mcp::messages_handler,
        mcp::mcp_handler,
    ),
    components(schemas(handlers::system::ServiceStatus, handlers::system::HealthResponse)),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Unauthenticated liveness endpoints"),
        (name = "mcp", description = "MCP transports (bearer token required)")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState, docs_enabled: bool) -> Router {
    let protected = protected_routes(&state);
    assemble(state, protected, docs_enabled)
}

/// Same routes as [`create_router`], with a per-client limit on the MCP
/// routes. Health and docs stay outside the limiter.
pub fn create_rate_limited_router(
    state: AppState,
    docs_enabled: bool,
    limit: RateLimit,
) -> anyhow::Result<Router> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(limit.replenish_seconds.max(1))
        .burst_size(limit.burst.max(1))
        .key_extractor(ClientIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?;

    let protected = protected_routes(&state).layer(GovernorLayer::new(governor_conf));
    Ok(assemble(state, protected, docs_enabled))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/sse", get(mcp::sse_handler))
        .route(mcp::sse::MESSAGES_PATH, post(mcp::messages_handler))
        .route("/messages", post(mcp::messages_handler))
        .route("/mcp", post(mcp::mcp_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
}

fn assemble(state: AppState, protected: Router<AppState>, docs_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(protected);

    if docs_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));
    }

    app.with_state(state)
}
