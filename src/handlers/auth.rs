use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::app::{AppState, CookieConfig};
use crate::auth::extractors::{AuthClaims, device_id};
use crate::auth::refresh::IssuedRefreshToken;
use crate::error::AppError;
use crate::response::AppResponse;
use authgate_api::{
    LoginRequest, LoginResponse, LogoutAllResponse, MessageResponse, ReceiptRequest,
    RegisterRequest, ResendCodeRequest, UserResponse, VerifyEmailRequest,
};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<AppResponse<UserResponse>, AppError> {
    let Json(payload) = payload?;
    let user = state.sessions.register(payload).await?;
    Ok(AppResponse::created(user))
}

/// POST /auth/verify
pub async fn verify_email(
    State(state): State<AppState>,
    payload: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> Result<AppResponse<MessageResponse>, AppError> {
    let Json(payload) = payload?;
    Ok(AppResponse::ok(state.sessions.verify_email(payload).await?))
}

/// POST /auth/resend-code
pub async fn resend_code(
    State(state): State<AppState>,
    payload: Result<Json<ResendCodeRequest>, JsonRejection>,
) -> Result<AppResponse<MessageResponse>, AppError> {
    let Json(payload) = payload?;
    Ok(AppResponse::ok(state.sessions.resend_code(payload).await?))
}

/// POST /auth/login
///
/// The refresh token is only ever sent as an HttpOnly cookie.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<AppResponse<LoginResponse>, AppError> {
    let Json(payload) = payload?;
    let outcome = state.sessions.login(payload, &device_id(&headers)).await?;

    let cookie = refresh_cookie(&state.cookie, &outcome.refresh)?;
    Ok(AppResponse::ok(outcome.response).with_headers(cookie))
}

/// POST /auth/refresh
///
/// Any failure clears the cookie so the client falls back to logging in.
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = async {
        let raw = read_refresh_cookie(&headers).ok_or(AppError::InvalidRefreshToken)?;
        let outcome = state.sessions.refresh(&raw, &device_id(&headers)).await?;
        let cookie = refresh_cookie(&state.cookie, &outcome.refresh)?;
        Ok::<_, AppError>(AppResponse::ok(outcome.response).with_headers(cookie))
    }
    .await;

    match result {
        Ok(response) => response.into_response(),
        Err(err) => {
            let mut response = err.into_response();
            response.headers_mut().extend(clear_refresh_cookie(&state.cookie));
            response
        }
    }
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResponse<MessageResponse> {
    let raw = read_refresh_cookie(&headers);
    let message = state.sessions.logout(raw.as_deref()).await;
    AppResponse::ok(message).with_headers(clear_refresh_cookie(&state.cookie))
}

/// POST /auth/logout-all
///
/// Revokes every refresh token of the bearer. Access tokens already issued
/// stay valid until they expire.
pub async fn logout_all(
    State(state): State<AppState>,
    claims: AuthClaims,
) -> Result<AppResponse<LogoutAllResponse>, AppError> {
    let revoked = state.sessions.logout_all(claims.sub).await?;
    tracing::info!(
        user_id = %claims.sub,
        username = %claims.name,
        revoked = revoked.revoked_sessions,
        "Logged out everywhere"
    );
    Ok(AppResponse::ok(revoked).with_headers(clear_refresh_cookie(&state.cookie)))
}

/// POST /auth/internal/send-receipt
pub async fn send_receipt(
    State(state): State<AppState>,
    payload: Result<Json<ReceiptRequest>, JsonRejection>,
) -> Result<AppResponse<MessageResponse>, AppError> {
    let Json(payload) = payload?;
    Ok(AppResponse::ok(state.sessions.send_receipt(payload).await?))
}

// === Cookie helpers ===

/// Seconds until the token's own sliding expiry, which near the absolute
/// ceiling is shorter than the configured maximum.
fn cookie_max_age(config: &CookieConfig, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().clamp(0, config.max_age_secs)
}

fn refresh_cookie(
    config: &CookieConfig,
    token: &IssuedRefreshToken,
) -> Result<HeaderMap, AppError> {
    let mut value = format!(
        "{REFRESH_COOKIE}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}",
        token.raw,
        config.path,
        cookie_max_age(config, token.record.expires_at, Utc::now())
    );
    if config.secure {
        value.push_str("; Secure");
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&value).map_err(|_| AppError::internal("Failed to set cookie"))?,
    );
    Ok(headers)
}

fn clear_refresh_cookie(config: &CookieConfig) -> HeaderMap {
    let mut value = format!(
        "{REFRESH_COOKIE}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0",
        config.path
    );
    if config.secure {
        value.push_str("; Secure");
    }

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .find_map(|kv| match kv.trim().split_once('=') {
            Some((REFRESH_COOKIE, v)) if !v.trim().is_empty() => Some(v.trim().to_string()),
            _ => None,
        })
}
