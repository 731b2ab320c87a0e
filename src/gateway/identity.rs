//! Identity propagation across the gateway.
//!
//! Downstream services trust `X-User-ID` without checking anything, so the
//! gateway is the only place that may set it: the header is stripped from
//! every inbound request and re-set from a verified access token on
//! protected routes. This holds only while downstreams are unreachable
//! except through the gateway.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::auth::extractors::bearer_token;
use crate::auth::jwt::JwtManager;
use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Drops any client-supplied identity header.
pub async fn strip_identity(mut request: Request, next: Next) -> Response {
    if request.headers_mut().remove(USER_ID_HEADER).is_some() {
        tracing::debug!(path = %request.uri().path(), "Dropped client-supplied X-User-ID");
    }
    next.run(request).await
}

/// Rejects requests without a valid bearer token and stamps the verified
/// subject into `X-User-ID`.
pub async fn require_identity(
    State(jwt): State<JwtManager>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = {
        let token = bearer_token(request.headers())?;
        jwt.verify_token(token).map_err(|e| {
            tracing::debug!(path = %request.uri().path(), "Rejected bearer token: {e}");
            AppError::unauthorized("Invalid or expired token")
        })?
    };

    let subject = HeaderValue::from_str(&claims.sub.to_string())
        .map_err(|_| AppError::internal("subject is not a valid header value"))?;
    request.headers_mut().insert(USER_ID_HEADER, subject);

    Ok(next.run(request).await)
}
