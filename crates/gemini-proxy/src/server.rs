//! Axum HTTP server: request routing, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::{Method, StatusCode};
use reqwest::Url;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::{ProxyConfig, RoutingConfig, UnsupportedPathPolicy};
use crate::cors;
use crate::proxy::correlation;
use crate::proxy::forward::Forwarder;

/// Shared application state. Immutable for the life of the process.
pub struct AppState {
    pub routing: RoutingConfig,
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn from_config(config: &ProxyConfig) -> anyhow::Result<Self> {
        Ok(Self {
            routing: config.routing.clone(),
            forwarder: Forwarder::new(&config.upstream)?,
        })
    }
}

/// What the proxy does with a request, decided from method and path alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Forward,
    Unsupported,
}

impl Route {
    /// `OPTIONS` wins over everything; otherwise a case-sensitive prefix test
    /// on `path`, which must already be dot-segment resolved.
    pub fn classify(method: &Method, path: &str, prefix: &str) -> Self {
        if *method == Method::OPTIONS {
            Route::Preflight
        } else if path.starts_with(prefix) {
            Route::Forward
        } else {
            Route::Unsupported
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Route::Preflight => "preflight",
            Route::Forward => "forwarded",
            Route::Unsupported => "unsupported",
        }
    }
}

/// Fixed answer for paths outside the proxied prefix.
pub fn unsupported_response(policy: UnsupportedPathPolicy) -> Response {
    let mut response = match policy {
        UnsupportedPathPolicy::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        UnsupportedPathPolicy::UpgradeRequired => {
            (StatusCode::UPGRADE_REQUIRED, "Falie").into_response()
        }
    };
    cors::allow_any_origin(response.headers_mut());
    response
}

/// Build the application router. Every method and path lands in one handler.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let listen_addr = config.server.listen_address.clone();
    let app = build_router(AppState::from_config(&config)?);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(
        address = %listen_addr,
        upstream = %config.upstream.base_url,
        path_prefix = %config.routing.path_prefix,
        "gemini-proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gemini-proxy shut down gracefully");
    Ok(())
}

/// Classify `request` on the path the transport will send, so dot-segments
/// cannot step outside the prefix. The resolved target comes back with
/// [`Route::Forward`].
fn route_request(state: &AppState, request: &Request) -> (Route, Option<Url>) {
    if request.method() == Method::OPTIONS {
        return (Route::Preflight, None);
    }
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let Some(url) = state.forwarder.resolve(path_and_query) else {
        return (Route::Unsupported, None);
    };
    let route = match state.forwarder.routed_path(&url) {
        Some(path) => Route::classify(request.method(), path, &state.routing.path_prefix),
        None => Route::Unsupported,
    };
    match route {
        Route::Forward => (route, Some(url)),
        _ => (route, None),
    }
}

async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let request_id = correlation::generate_id();
    let (route, target) = route_request(&state, &request);
    let span =
        gemini_tracing::proxy_request_span!(&request_id, request.method(), request.uri().path());

    async {
        let response = match (route, target) {
            (Route::Preflight, _) => cors::preflight(),
            (Route::Forward, Some(url)) => {
                match state.forwarder.forward(request, url, &request_id).await {
                    Ok(response) => response,
                    Err(e) => {
                        let span = tracing::Span::current();
                        span.record("outcome", "failed");
                        span.record("status", e.status().as_u16());
                        return e.into_response();
                    }
                }
            }
            _ => unsupported_response(state.routing.unsupported_path),
        };

        let span = tracing::Span::current();
        span.record("outcome", route.as_str());
        span.record("status", response.status().as_u16());
        if route != Route::Forward {
            tracing::debug!(outcome = route.as_str(), "Answered locally");
        }
        response
    }
    .instrument(span)
    .await
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
