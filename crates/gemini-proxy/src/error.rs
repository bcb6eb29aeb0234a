//! Proxy-local failures and their HTTP rendering.
//!
//! Upstream statuses are never mapped here; they are relayed as-is. Only
//! failures to obtain an upstream response at all become local responses.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::cors;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The configured upstream timeout elapsed before a response arrived.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(#[source] reqwest::Error),

    /// DNS, connect, TLS or protocol failure talking to the upstream.
    #[error("upstream connection error: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),

    /// The inbound path/query does not form a valid upstream URL.
    #[error("invalid upstream request: {0}")]
    InvalidTarget(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::UpstreamTimeout(e)
        } else if e.is_builder() {
            ProxyError::InvalidTarget(e)
        } else {
            ProxyError::UpstreamUnreachable(e)
        }
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> &'static str {
        match self {
            ProxyError::UpstreamTimeout(_) => "upstream timeout",
            ProxyError::UpstreamUnreachable(_) => "upstream connection error",
            ProxyError::InvalidTarget(_) => "invalid upstream request",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.body()).into_response();
        cors::allow_any_origin(response.headers_mut());
        response
    }
}
