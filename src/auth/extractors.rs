use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, header, request::Parts};
use uuid::Uuid;

use crate::auth::jwt::{Claims, JwtManager};
use crate::error::AppError;

const BEARER: &str = "Bearer ";

/// Header carrying the client's device identifier.
pub const DEVICE_ID_HEADER: &str = "x-device-id";
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Verified access token claims for routes behind `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub sub: Uuid,
    pub name: String,
}

impl From<Claims> for AuthClaims {
    fn from(c: Claims) -> Self {
        Self {
            sub: c.sub,
            name: c.name,
        }
    }
}

/// Returns the raw token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Malformed authorization header"))?;

    value
        .strip_prefix(BEARER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("Malformed authorization header"))
}

pub fn device_id(headers: &HeaderMap) -> String {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_DEVICE)
        .to_string()
}

impl<S> FromRequestParts<S> for AuthClaims
where
    JwtManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jwt = JwtManager::from_ref(state);
        let token = bearer_token(&parts.headers)?;
        let claims = jwt
            .verify_token(token)
            .map_err(|_| AppError::unauthorized("Invalid token"))?;

        Ok(AuthClaims::from(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        let headers = headers_with("authorization", "Bearer abc.def.ghi");
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn missing_or_non_bearer_header_is_unauthorized() {
        assert!(bearer_token(&HeaderMap::new()).is_err());
        assert!(bearer_token(&headers_with("authorization", "Basic dXNlcjpwYXNz")).is_err());
        assert!(bearer_token(&headers_with("authorization", "Bearer ")).is_err());
    }

    #[test]
    fn device_id_defaults_to_unknown() {
        assert_eq!(device_id(&HeaderMap::new()), "unknown");
        assert_eq!(device_id(&headers_with("x-device-id", "  ")), "unknown");
        assert_eq!(device_id(&headers_with("x-device-id", "phone-1")), "phone-1");
    }
}
