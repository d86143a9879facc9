/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use statusguard_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = statusguard_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use crate::middleware::identity::{require_admin_enabled, require_identity};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use statusguard_shared::engine::Engine;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Authorization and entitlement engine (owns the pool)
    pub engine: Engine,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            engine: Engine::new(db, config.engine_config()),
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token validation
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /v1/
///     ├── GET    /config               # Feature toggles (public)
///     ├── GET    /subscription         # Caller's entitlement and usage
///     ├── /groups                      # Membership Store
///     │   ├── POST|GET /
///     │   ├── POST  /invitations
///     │   ├── GET|PATCH|DELETE /:id
///     │   ├── GET   /:id/invitations
///     │   └── PATCH|DELETE /:id/members/:user_id
///     ├── /invitations                 # Invitation inbox
///     │   ├── GET   /
///     │   └── PATCH /:id
///     ├── /projects                    # Resource Guard
///     │   ├── POST|GET /
///     │   ├── GET|PATCH /:id
///     │   └── GET   /:id/incidents
///     ├── /incidents
///     │   ├── POST  /
///     │   └── POST  /:id/resolve
///     └── /admin/*                     # Admin Override Layer (503 when disabled)
/// ```
///
/// # Middleware Stack
///
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Admin feature gate (admin routes only, before authentication)
/// 4. Identity (every `/v1` route except `/config`)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let group_routes = Router::new()
        .route(
            "/",
            post(routes::groups::create_group).get(routes::groups::list_groups),
        )
        .route("/invitations", post(routes::invitations::create_invitation))
        .route(
            "/:id",
            get(routes::groups::get_group)
                .patch(routes::groups::update_group)
                .delete(routes::groups::deactivate_group),
        )
        .route(
            "/:id/invitations",
            get(routes::invitations::list_group_invitations),
        )
        .route(
            "/:id/members/:user_id",
            patch(routes::groups::update_member_role).delete(routes::groups::remove_member),
        );

    let invitation_routes = Router::new()
        .route("/", get(routes::invitations::inbox))
        .route("/:id", patch(routes::invitations::respond));

    let project_routes = Router::new()
        .route(
            "/",
            post(routes::projects::create_project).get(routes::projects::list_projects),
        )
        .route(
            "/:id",
            get(routes::projects::get_project).patch(routes::projects::update_project),
        )
        .route("/:id/incidents", get(routes::projects::list_incidents));

    let incident_routes = Router::new()
        .route("/", post(routes::projects::create_incident))
        .route("/:id/resolve", post(routes::projects::resolve_incident));

    let user_routes = Router::new()
        .route("/subscription", get(routes::account::subscription))
        .nest("/groups", group_routes)
        .nest("/invitations", invitation_routes)
        .nest("/projects", project_routes)
        .nest("/incidents", incident_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    // Gate layer is added last so it runs before identity resolution
    let admin_routes = Router::new()
        .route("/stats", get(routes::admin::stats))
        .route("/users", get(routes::admin::list_users))
        .route(
            "/users/:id",
            get(routes::admin::get_user).patch(routes::admin::update_user),
        )
        .route("/subscriptions", get(routes::admin::list_subscriptions))
        .route("/groups", get(routes::admin::list_groups))
        .route("/groups/:id", patch(routes::admin::update_group))
        .route("/projects", get(routes::admin::list_projects))
        .route("/projects/:id", patch(routes::admin::update_project))
        .route("/incidents", get(routes::admin::list_incidents))
        .route("/invitations", get(routes::admin::list_invitations))
        .route("/decisions", get(routes::admin::list_decisions))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin_enabled,
        ));

    let v1_routes = Router::new()
        .route("/config", get(routes::account::feature_config))
        .merge(user_routes)
        .nest("/admin", admin_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
