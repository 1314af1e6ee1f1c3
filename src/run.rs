use axum::Router;
use axum::http::Method;
use axum::routing::get;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use x402_axum::facilitator_client::FacilitatorClient;
use x402_axum::{BasicPaywall, PaymentProxy, Paywall, ResourceServer, X402Middleware};
use x402_chain_eip155::register_exact_evm_scheme;
use x402_types::facilitator::Facilitator;
use x402_types::scheme::SchemeRegistry;

use crate::config::{Config, ConfigError};
use crate::handlers;
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;

/// Starts the x402 Gate server.
///
/// - Loads `.env` variables and installs telemetry.
/// - Loads the config; a missing `FACILITATOR_URL` or `EVM_ADDRESS` fails here.
/// - Resolves every route against the scheme registry, then checks them
///   against the facilitator's `/supported` list.
/// - Serves until SIGTERM or SIGINT.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .map_err(|_| "Failed to initialize rustls crypto provider")?;

    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register()?;

    let config = Config::load()?;

    let mut registry = SchemeRegistry::new();
    register_exact_evm_scheme(&mut registry);
    let facilitator =
        FacilitatorClient::try_new(config.facilitator_url().clone()).map_err(ConfigError::from)?;
    tracing::info!("Using facilitator on {}", facilitator.base_url());
    let server = Arc::new(ResourceServer::new(Arc::new(registry), facilitator));

    let http_endpoints = app(&config, server)
        .await?
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET])
                .allow_headers(cors::Any)
                .expose_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}

/// The paid resources behind their payment layers.
///
/// `/api/weather` has its own layer; everything else goes through the proxy,
/// which only intercepts the paths its `matcher` allows.
pub async fn app<F>(config: &Config, server: Arc<ResourceServer<F>>) -> Result<Router, ConfigError>
where
    F: Facilitator + Send + Sync + 'static,
{
    let paywall = Paywall::new(BasicPaywall, config.paywall().clone());

    let mut x402 = X402Middleware::new(server.clone()).with_paywall(paywall.clone());
    let mut proxy = PaymentProxy::try_new(config.proxy(), server)?.with_paywall(paywall);
    if let Some(base_url) = config.base_url() {
        x402 = x402.with_base_url(base_url.clone());
        proxy = proxy.with_base_url(base_url.clone());
    }

    let weather = x402.with_route(config.weather())?.initialize().await;
    let proxy = proxy.initialize().await;

    Ok(Router::new()
        .route("/protected", get(handlers::get_protected))
        .route("/api/weather", get(handlers::get_weather).layer(weather))
        .layer(proxy))
}
