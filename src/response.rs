use authgate_api::{AppResponse as ApiResponse, StatusCode as ApiStatusCode};
use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Axum-facing wrapper around `authgate_api::AppResponse`.
///
/// Adds `IntoResponse` and optional extra headers (the session cookie
/// travels this way).
///
/// ```rust,ignore
/// AppResponse::ok(body).with_headers(cookie_headers)
/// AppResponse::created(user)
/// ```
pub struct AppResponse<T> {
    inner: ApiResponse<T>,
    headers: Option<HeaderMap>,
}

impl<T> AppResponse<T>
where
    T: Serialize,
{
    pub fn new(inner: ApiResponse<T>) -> Self {
        Self {
            inner,
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// 200 OK with data
    pub fn ok(data: T) -> Self {
        Self::new(ApiResponse::ok(data))
    }

    /// 201 Created with data
    pub fn created(data: T) -> Self {
        Self::new(ApiResponse::created(data))
    }
}

fn convert_status(api_status: ApiStatusCode) -> StatusCode {
    match api_status {
        ApiStatusCode::Ok => StatusCode::OK,
        ApiStatusCode::Created => StatusCode::CREATED,
    }
}

impl<T> IntoResponse for AppResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let status = convert_status(self.inner.status);

        let mut response = match self.inner.data {
            Some(data) => (status, Json(data)).into_response(),
            None => status.into_response(),
        };

        if let Some(headers) = self.headers {
            response.headers_mut().extend(headers);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[derive(Serialize)]
    struct TestData {
        message: String,
    }

    #[test]
    fn created_response_sets_201() {
        let response = AppResponse::created(TestData {
            message: "created".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn extra_headers_are_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, "a=b".parse().unwrap());

        let response = AppResponse::ok(TestData {
            message: "with headers".to_string(),
        })
        .with_headers(headers)
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::SET_COOKIE], "a=b");
    }

    #[test]
    fn status_conversion_covers_every_variant() {
        assert_eq!(convert_status(ApiStatusCode::Ok), StatusCode::OK);
        assert_eq!(convert_status(ApiStatusCode::Created), StatusCode::CREATED);
    }
}
