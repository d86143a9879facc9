/// Identity middleware
///
/// The identity provider issues HS256 tokens whose subject is the caller's
/// verified e-mail. This layer validates the token, resolves the e-mail to an
/// [`Identity`] (creating the user and a free subscription on first sight),
/// and inserts it into the request extensions for handlers to extract.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use statusguard_shared::auth::{admin::ADMIN_FEATURE, identity::Identity, jwt};

use crate::{app::AppState, error::ApiError};

/// Extracts the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid identity token (401)
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = bearer_token(auth_header)
        .ok_or_else(|| ApiError::Unauthorized("Expected Bearer token".to_string()))?;

    let claims = jwt::validate_token(token, state.jwt_secret())?;
    let identity = Identity::resolve(state.engine.db(), &claims.sub).await?;

    tracing::debug!(user_id = %identity.user_id, "Identity resolved");
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Answers 503 for the admin surface when the admin toggle is off
///
/// Runs before authentication so a disabled surface is indistinguishable
/// from an absent one.
pub async fn require_admin_enabled(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.features.admin_enabled {
        return Err(ApiError::ServiceUnavailable(format!(
            "The {} feature is disabled",
            ADMIN_FEATURE
        )));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc.def"), None);
    }
}
