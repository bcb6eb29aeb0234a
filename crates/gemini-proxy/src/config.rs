//! Configuration types and loading logic.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use gemini_tracing::TracingConfig;
use http::HeaderName;
use serde::Deserialize;

/// Prefix for environment overrides, e.g. `GEMINI_PROXY_UPSTREAM__BASE_URL`.
pub const ENV_PREFIX: &str = "GEMINI_PROXY_";

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// The single upstream origin every proxied request goes to.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Scheme and authority of the upstream, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Header that carries the key extracted from `Authorization`.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Overall upstream timeout. Unset means the proxy imposes none, which
    /// long streamed generations rely on.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Honor `HTTPS_PROXY`/`HTTP_PROXY`/`NO_PROXY` for the upstream call.
    #[serde(default = "default_true")]
    pub use_system_proxy: bool,
}

/// Which requests are forwarded and what everything else receives.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Case-sensitive literal prefix a path must start with to be proxied.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    #[serde(default)]
    pub unsupported_path: UnsupportedPathPolicy,
}

/// Response for paths outside the proxied prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnsupportedPathPolicy {
    /// `404 Not Found` with body `Not Found`.
    #[default]
    NotFound,
    /// `426 Upgrade Required` with body `Falie`.
    UpgradeRequired,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_header() -> String {
    "x-goog-api-key".to_string()
}

fn default_true() -> bool {
    true
}

fn default_path_prefix() -> String {
    "/v1beta".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_header: default_api_key_header(),
            timeout_secs: None,
            connect_timeout_secs: None,
            use_system_proxy: true,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            unsupported_path: UnsupportedPathPolicy::default(),
        }
    }
}

/// Overrides taken from the command line; they beat file and env values.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub listen: Option<String>,
    pub upstream: Option<String>,
}

impl ProxyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. CLI overrides
    /// 2. Environment variables (GEMINI_PROXY_ prefix, __ for nesting)
    /// 3. TOML config file (may be absent)
    /// 4. Defaults
    pub fn load(config_path: &str, cli: &CliOverrides) -> anyhow::Result<Self> {
        let mut figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(listen) = &cli.listen {
            figment = figment.merge(Serialized::default("server.listen_address", listen));
        }
        if let Some(upstream) = &cli.upstream {
            figment = figment.merge(Serialized::default("upstream.base_url", upstream));
        }

        let mut config: ProxyConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the request path relies on, normalizing the base URL.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        let trimmed = self.upstream.base_url.trim_end_matches('/');
        let url = reqwest::Url::parse(trimmed)
            .map_err(|e| anyhow::anyhow!("invalid upstream.base_url {trimmed:?}: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("upstream.base_url must use http or https, got {:?}", url.scheme());
        }
        if url.host_str().is_none() {
            anyhow::bail!("upstream.base_url has no host: {trimmed:?}");
        }
        if url.query().is_some() || url.fragment().is_some() {
            anyhow::bail!("upstream.base_url must not carry a query or fragment: {trimmed:?}");
        }
        self.upstream.base_url = trimmed.to_string();

        if !self.routing.path_prefix.starts_with('/') {
            anyhow::bail!(
                "routing.path_prefix must start with '/', got {:?}",
                self.routing.path_prefix
            );
        }

        HeaderName::try_from(self.upstream.api_key_header.as_str()).map_err(|e| {
            anyhow::anyhow!(
                "invalid upstream.api_key_header {:?}: {e}",
                self.upstream.api_key_header
            )
        })?;

        Ok(())
    }
}
