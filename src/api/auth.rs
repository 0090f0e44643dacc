//! Request authentication and rate limiting, combined into one extractor
//! since both gate every authenticated route before any handler body runs.
//!
//! Grounded on `security::resolve_owner_id`'s priority-chain extractor
//! style in the teacher crate, collapsed to this service's single source:
//! the `X-H51-APIKey` header.

use std::net::IpAddr;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::domain::Account;
use crate::error::ApiError;
use crate::queue::QueueBackend;
use crate::ratelimit::{RateLimitBackend, RateLimitHeaders};

use super::response::apply_rate_limit_headers;
use super::state::AppState;

const API_KEY_HEADER: &str = "x-h51-apikey";

/// The authenticated account for this request, plus the rate-limit headers
/// every authenticated response must carry.
pub struct AuthContext {
    pub account: Account,
    pub rate_limit: RateLimitHeaders,
}

/// A failed authentication/rate-limit check. Carries the rate-limit
/// headers whenever they were computed before the rejection (i.e. every
/// case except a missing or unknown API key), so a `request_limit_exceeded`
/// response still reports `X-H51-RateLimit-*` like a successful one would.
pub struct AuthRejection {
    pub error: ApiError,
    pub rate_limit: Option<RateLimitHeaders>,
}

impl From<ApiError> for AuthRejection {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            rate_limit: None,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let mut response = self.error.into_response();
        if let Some(rate_limit) = self.rate_limit {
            apply_rate_limit_headers(response.headers_mut(), rate_limit);
        }
        response
    }
}

impl<Q, R> FromRequestParts<AppState<Q, R>> for AuthContext
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<Q, R>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing X-H51-APIKey header"))?;

        let account = state
            .account_repo
            .by_api_key(api_key)
            .await
            .map_err(|_| ApiError::unauthorized("unknown api key"))?;

        if let Some(ip) = source_ip(parts) {
            if !account.ip_allowed(ip) {
                return Err(ApiError::forbidden("source ip not allowed for this account").into());
            }
        }

        let (rate_limit, over_limit) = state
            .rate_limiter
            .record_request(account.id, account.api_rate_limit_per_second)
            .await
            .map_err(|error| ApiError::error(error.to_string()))?;

        if over_limit {
            return Err(AuthRejection {
                error: ApiError::request_limit_exceeded(),
                rate_limit: Some(rate_limit),
            });
        }

        Ok(Self { account, rate_limit })
    }
}

fn source_ip(parts: &Parts) -> Option<IpAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip())
}
