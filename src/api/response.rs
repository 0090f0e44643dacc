//! Shared response-building helpers: every authenticated response (success
//! or failure) carries the three `X-H51-RateLimit-*` headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ratelimit::RateLimitHeaders;

pub fn apply_rate_limit_headers(headers: &mut HeaderMap, rate_limit: RateLimitHeaders) {
    headers.insert(
        HeaderName::from_static("x-h51-ratelimit-limit"),
        HeaderValue::from(rate_limit.limit),
    );
    headers.insert(
        HeaderName::from_static("x-h51-ratelimit-remaining"),
        HeaderValue::from(rate_limit.remaining),
    );
    headers.insert(
        HeaderName::from_static("x-h51-ratelimit-reset"),
        HeaderValue::from(rate_limit.reset_secs),
    );
}

/// Build a JSON response carrying the rate-limit headers every
/// authenticated call must return, regardless of status code.
pub fn json_with_rate_limit<T: Serialize>(
    status: axum::http::StatusCode,
    rate_limit: RateLimitHeaders,
    body: &T,
) -> Response {
    let mut response = (status, Json(body)).into_response();
    apply_rate_limit_headers(response.headers_mut(), rate_limit);
    response
}
