//! gemini-proxy: CORS-enabling reverse proxy for the Google Generative
//! Language API that accepts `Authorization: Bearer <key>` credentials.

mod config;
mod cors;
mod error;
mod proxy;
mod server;
#[cfg(test)]
mod testing;

use config::{CliOverrides, ProxyConfig};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1).cloned())
    };

    let config_path = flag("--config")
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("GEMINI_PROXY_CONFIG").ok())
        .unwrap_or_else(|| "gemini-proxy.toml".to_string());

    let cli = CliOverrides {
        listen: flag("--listen"),
        upstream: flag("--upstream"),
    };

    let config = ProxyConfig::load(&config_path, &cli)?;

    // Build the tokio runtime first; the tonic OTLP exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = gemini_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            upstream = %config.upstream.base_url,
            path_prefix = %config.routing.path_prefix,
            unsupported_path = ?config.routing.unsupported_path,
            otlp_export = tracing_guard.exporting(),
            "Starting gemini-proxy"
        );

        server::run(config).await
    })
}
