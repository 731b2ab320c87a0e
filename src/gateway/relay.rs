use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, Uri, header},
    response::Response,
};
use url::Url;

use crate::error::AppError;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct Upstream {
    pub base: Url,
    pub client: reqwest::Client,
}

/// Forwards the request to the upstream unchanged apart from hop-by-hop
/// headers, and relays the response back.
pub async fn forward(
    State(upstream): State<Upstream>,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let target = upstream_url(&upstream.base, &parts.uri);
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::invalid_input(format!("Unreadable request body: {e}")))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);

    let reply = upstream
        .client
        .request(parts.method, target.clone())
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(upstream = %target, "Upstream request failed: {e}");
            AppError::bad_gateway(e.to_string())
        })?;

    let status = reply.status();
    let mut reply_headers = reply.headers().clone();
    strip_hop_by_hop(&mut reply_headers);
    let bytes = reply
        .bytes()
        .await
        .map_err(|e| AppError::bad_gateway(format!("Upstream body read failed: {e}")))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = reply_headers;
    Ok(response)
}

fn upstream_url(base: &Url, uri: &Uri) -> Url {
    let mut target = base.clone();
    target.set_path(uri.path());
    target.set_query(uri.query());
    target
}

/// Removes connection-scoped headers, which must not be forwarded.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::HOST,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}
