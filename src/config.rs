//! Configuration for the x402 Gate server.
//!
//! Read from a JSON file (`--config`, `$CONFIG`, or `./config.json`). String
//! values of the facilitator URL and payout addresses may reference the
//! environment as `$VAR` or `${VAR}`; an unset variable fails the load, so
//! a missing `FACILITATOR_URL` or `EVM_ADDRESS` stops the process before it
//! binds a socket.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use url::Url;
use x402_axum::facilitator_client::FacilitatorClientError;
use x402_axum::{ConfigurationError, PaymentProxyConfig, PaywallConfig, RouteConfig};
use x402_types::config::LiteralOrEnv;

/// CLI arguments for the x402 Gate server.
#[derive(Parser, Debug)]
#[command(name = "x402-gate")]
#[command(about = "Payment-gated HTTP resource server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// `host` and `port` fall back to `$HOST`/`$PORT`, then to hardcoded
/// defaults. The paywall branding falls back to `$APP_NAME`/`$APP_LOGO`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    facilitator_url: LiteralOrEnv<Url>,
    /// Public origin of this server, used in challenge resource URLs.
    #[serde(default)]
    base_url: Option<LiteralOrEnv<Url>>,
    #[serde(default = "config_defaults::default_paywall")]
    paywall: PaywallConfig,
    /// Routes guarded by the path-matching proxy.
    proxy: PaymentProxyConfig,
    /// The `/api/weather` endpoint, guarded by its own layer.
    weather: RouteConfig,
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};
    use x402_axum::PaywallConfig;

    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_APP_NAME: &str = "x402 Gate Demo";
    pub const DEFAULT_APP_LOGO: &str = "/x402-icon-blue.png";

    /// $PORT, then 3000.
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// $HOST, then 0.0.0.0.
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn default_paywall() -> PaywallConfig {
        PaywallConfig {
            app_name: env::var("APP_NAME").unwrap_or_else(|_| DEFAULT_APP_NAME.to_string()),
            app_logo: Some(env::var("APP_LOGO").unwrap_or_else(|_| DEFAULT_APP_LOGO.to_string())),
            testnet: true,
        }
    }
}

/// Everything that stops the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid route configuration: {0}")]
    Route(#[from] ConfigurationError),
    #[error("Invalid facilitator: {0}")]
    Facilitator(#[from] FacilitatorClientError),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn facilitator_url(&self) -> &Url {
        self.facilitator_url.inner()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref().map(|url| url.inner())
    }

    pub fn paywall(&self) -> &PaywallConfig {
        &self.paywall
    }

    pub fn proxy(&self) -> &PaymentProxyConfig {
        &self.proxy
    }

    pub fn weather(&self) -> &RouteConfig {
        &self.weather
    }

    /// Loads the file named on the command line.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        content.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}
