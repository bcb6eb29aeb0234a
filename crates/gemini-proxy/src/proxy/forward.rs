//! Streaming forwarder to the upstream API.
//!
//! Bodies flow chunk by chunk in both directions: the inbound body is handed
//! to reqwest as a stream and the upstream body is handed to hyper as a
//! stream, so back-pressure runs end to end and nothing is accumulated.
//! Dropping the client response drops the upstream call with it.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::{Body, HttpBody as _};
use axum::extract::Request;
use axum::response::Response;
use bytes::Bytes;
use futures_core::Stream;
use http::HeaderName;
use hyper::ext::ReasonPhrase;
use reqwest::Url;
use tracing::Instrument;

use super::headers;
use crate::config::UpstreamConfig;
use crate::cors;
use crate::error::ProxyError;

/// Sends proxied requests to the single configured upstream.
pub struct Forwarder {
    client: reqwest::Client,
    base_url: String,
    /// Path component of `base_url` without its trailing slash; empty at the root.
    base_path: String,
    api_key_header: HeaderName,
}

impl Forwarder {
    /// Build the pooled upstream client. Expects a validated config.
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base_path = Url::parse(&base_url)?.path().trim_end_matches('/').to_string();

        Ok(Self {
            client: builder.build()?,
            base_url,
            base_path,
            api_key_header: HeaderName::try_from(config.api_key_header.as_str())?,
        })
    }

    /// Upstream origin followed by the inbound path and query, verbatim.
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.base_url)
    }

    /// Parse the target URL the way the transport will, resolving dot-segments
    /// (including `%2e` spellings). `None` if the result is not a URL.
    pub fn resolve(&self, path_and_query: &str) -> Option<Url> {
        Url::parse(&self.target_url(path_and_query)).ok()
    }

    /// Path of a resolved target relative to the upstream base. `None` when
    /// dot-segments climbed out of the base path.
    pub fn routed_path<'a>(&self, url: &'a Url) -> Option<&'a str> {
        url.path().strip_prefix(self.base_path.as_str())
    }

    /// Forward `request` to the already resolved `url` and relay the upstream
    /// response.
    ///
    /// The returned response carries the upstream status, reason phrase and
    /// headers, with `Access-Control-Allow-Origin: *` forced. Transport
    /// failures come back as [`ProxyError`]; upstream error statuses do not.
    pub async fn forward(
        &self,
        request: Request,
        url: Url,
        request_id: &str,
    ) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();

        // The query may carry a `key=` credential, so only the path is logged.
        let mut logged = url.clone();
        logged.set_query(None);
        let target = logged.to_string();
        let span = gemini_tracing::upstream_forward_span!(request_id, target);
        let start = Instant::now();

        async {
            let mut builder = self
                .client
                .request(parts.method.clone(), url)
                .headers(headers::translate(&parts.headers, &self.api_key_header));

            // Bodyless requests stay bodyless instead of becoming empty chunked uploads.
            if !body.is_end_stream() {
                builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
            }

            let upstream = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let error = ProxyError::from(e);
                    let span = tracing::Span::current();
                    span.record("latency_ms", start.elapsed().as_millis() as u64);
                    span.record("status", error.status().as_u16());
                    tracing::error!(error = %error, "Upstream request failed");
                    return Err(error);
                }
            };

            let latency = start.elapsed().as_millis() as u64;
            let span = tracing::Span::current();
            span.record("latency_ms", latency);
            span.record("status", upstream.status().as_u16());
            tracing::info!(
                status = upstream.status().as_u16(),
                latency_ms = latency,
                "Upstream responded"
            );

            Ok(relay(upstream, span, start))
        }
        .instrument(span)
        .await
    }
}

/// Turn the upstream response into the client response without buffering.
fn relay(upstream: reqwest::Response, span: tracing::Span, start: Instant) -> Response {
    let status = upstream.status();
    let reason = upstream.extensions().get::<ReasonPhrase>().cloned();

    let mut headers = headers::end_to_end(upstream.headers());
    cors::allow_any_origin(&mut headers);

    let body = RelayBody {
        inner: Box::pin(upstream.bytes_stream()),
        span,
        start,
        bytes: 0,
        first_chunk_seen: false,
    };

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    if let Some(reason) = reason {
        response.extensions_mut().insert(reason);
    }
    response
}

/// Pass-through stream over the upstream body that records relay timing on
/// the forward span. Chunks are yielded as soon as they arrive.
struct RelayBody {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    span: tracing::Span,
    /// When the upstream request was sent.
    start: Instant,
    bytes: u64,
    first_chunk_seen: bool,
}

impl Stream for RelayBody {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !self.first_chunk_seen {
                    self.first_chunk_seen = true;
                    self.span
                        .record("ttfb_ms", self.start.elapsed().as_millis() as u64);
                }
                self.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.span.in_scope(|| {
                    tracing::warn!(error = %e, bytes_relayed = self.bytes, "Upstream body stream failed");
                });
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.span
                    .record("total_duration_ms", self.start.elapsed().as_millis() as u64);
                self.span.record("bytes_relayed", self.bytes);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
