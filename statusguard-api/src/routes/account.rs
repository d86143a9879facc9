/// Caller-facing account endpoints
///
/// # Endpoints
///
/// - `GET /v1/config` - Feature toggles read at startup
/// - `GET /v1/subscription` - Caller's subscription, resolved limits and usage

use crate::{app::AppState, config::FeatureToggles, error::ApiResult};
use axum::{extract::State, Extension, Json};
use statusguard_shared::auth::identity::Identity;
use statusguard_shared::engine::SubscriptionOverview;

pub async fn feature_config(State(state): State<AppState>) -> Json<FeatureToggles> {
    Json(state.config.features)
}

/// Subscription overview
///
/// With billing disabled the entitlement is unlimited regardless of the
/// stored subscription.
///
/// ```text
/// GET /v1/subscription
/// Authorization: Bearer <jwt_token>
/// ```
pub async fn subscription(
    State(state): State<AppState>,
    Extension(actor): Extension<Identity>,
) -> ApiResult<Json<SubscriptionOverview>> {
    Ok(Json(state.engine.subscription_overview(&actor).await?))
}
