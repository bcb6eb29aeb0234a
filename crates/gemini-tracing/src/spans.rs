//! Span builder helpers for gemini-proxy instrumentation.

/// Create a tracing span for one inbound request.
///
/// Usage: `let span = proxy_request_span!(request_id, method, path);`
///
/// `status` and `outcome` are recorded once the router has decided how to
/// answer (`preflight`, `unsupported`, `forwarded`, `failed`).
#[macro_export]
macro_rules! proxy_request_span {
    ($request_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "proxy_request",
            request_id = %$request_id,
            method = %$method,
            path = %$path,
            outcome = tracing::field::Empty,
            status = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the upstream call.
///
/// Relay fields are recorded by the response body stream:
/// - `ttfb_ms`: milliseconds from request send to the first body chunk
/// - `total_duration_ms`: milliseconds from request send to stream end
/// - `bytes_relayed`: body bytes handed to the client
#[macro_export]
macro_rules! upstream_forward_span {
    ($request_id:expr, $target:expr) => {
        tracing::info_span!(
            "upstream_forward",
            request_id = %$request_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            ttfb_ms = tracing::field::Empty,
            total_duration_ms = tracing::field::Empty,
            bytes_relayed = tracing::field::Empty,
        )
    };
}
