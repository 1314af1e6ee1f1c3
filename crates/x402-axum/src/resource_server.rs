//! Scheme registry plus facilitator: everything the gate needs to price,
//! verify and settle a payment.
//!
//! Route building happens once at startup and fails with a
//! [`ConfigurationError`]. Per-request operations never fail; they return a
//! [`VerificationResult`] or a [`SettlementResult`] carrying an [`ErrorKind`].

use std::sync::Arc;
use x402_types::facilitator::{Facilitator, FacilitatorError};
use x402_types::proto::{
    PaymentPayload, PaymentRequirements, SettleRequest, SettleResponse, VerifyRequest,
    VerifyResponse,
};
use x402_types::scheme::SchemeRegistry;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::errors::{ConfigurationError, ErrorKind};
use crate::route::{
    AcceptOption, DEFAULT_MAX_TIMEOUT_SECONDS, ProtectedRoute, ResourceInfoBuilder, RouteConfig,
};

/// Outcome of checking a proof against one requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Valid { payer: String },
    Invalid { kind: ErrorKind, reason: String },
}

/// Outcome of collecting a verified payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementResult {
    Settled {
        transaction: String,
        payer: String,
        network: String,
    },
    Failed {
        kind: ErrorKind,
        reason: String,
    },
}

#[derive(Debug)]
pub struct ResourceServer<F> {
    registry: Arc<SchemeRegistry>,
    facilitator: F,
}

impl<F> ResourceServer<F> {
    pub fn new(registry: Arc<SchemeRegistry>, facilitator: F) -> Self {
        Self {
            registry,
            facilitator,
        }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    pub fn facilitator(&self) -> &F {
        &self.facilitator
    }

    /// Resolves one accept option into a concrete requirement.
    ///
    /// The scheme checks `payTo` and the resolved `asset`, so a route never
    /// advertises an address nobody can pay.
    pub fn build_requirements(
        &self,
        option: &AcceptOption,
    ) -> Result<PaymentRequirements, ConfigurationError> {
        let server = self.registry.lookup(&option.scheme, &option.network)?;
        server
            .validate_address(option.pay_to.inner(), &option.network)
            .map_err(|source| ConfigurationError::InvalidPayTo {
                scheme: option.scheme.clone(),
                network: option.network.clone(),
                source,
            })?;
        let amount = server
            .parse_price(&option.price, &option.network)
            .map_err(|source| ConfigurationError::InvalidPrice {
                scheme: option.scheme.clone(),
                network: option.network.clone(),
                source,
            })?;
        server
            .validate_address(&amount.asset, &option.network)
            .map_err(|source| ConfigurationError::InvalidAsset {
                scheme: option.scheme.clone(),
                network: option.network.clone(),
                source,
            })?;
        Ok(PaymentRequirements {
            scheme: option.scheme.clone(),
            network: option.network.clone(),
            amount: amount.amount,
            pay_to: option.pay_to.inner().clone(),
            max_timeout_seconds: option
                .max_timeout_seconds
                .unwrap_or(DEFAULT_MAX_TIMEOUT_SECONDS),
            asset: amount.asset,
            extra: amount.extra,
        })
    }

    /// Resolves a route configuration; `name` only labels errors.
    pub fn build_route(
        &self,
        name: &str,
        config: &RouteConfig,
    ) -> Result<ProtectedRoute, ConfigurationError> {
        if config.accepts.is_empty() {
            return Err(ConfigurationError::EmptyAccepts(name.to_string()));
        }
        let accepts = config
            .accepts
            .iter()
            .map(|option| self.build_requirements(option))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProtectedRoute {
            accepts,
            resource: ResourceInfoBuilder {
                description: config.description.clone(),
                mime_type: config.mime_type.clone(),
                url: config.resource.as_ref().map(|url| url.to_string()),
            },
            extensions: config.resolved_extensions(),
        })
    }
}

impl<F> ResourceServer<F>
where
    F: Facilitator + Send + Sync,
{
    /// Checks routes against what the facilitator advertises and lets each
    /// scheme enhance its requirements.
    ///
    /// Nothing here is fatal: an unreachable facilitator or an unadvertised
    /// requirement is logged and the routes are served as configured.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.resource_server.initialize", skip_all)
    )]
    pub async fn initialize<'a, I>(&self, routes: I)
    where
        I: IntoIterator<Item = &'a mut ProtectedRoute>,
    {
        let supported = match self.facilitator.supported().await {
            Ok(supported) => supported,
            Err(err) => {
                tracing::warn!(error = %err, "Facilitator unreachable at startup, requirements not checked");
                return;
            }
        };
        for route in routes {
            for requirement in route.accepts.iter_mut() {
                let Some(kind) = supported.find_kind(&requirement.scheme, &requirement.network)
                else {
                    tracing::warn!(
                        scheme = %requirement.scheme,
                        network = %requirement.network,
                        "Facilitator does not advertise this scheme and network"
                    );
                    continue;
                };
                if let Ok(server) = self.registry.lookup(&requirement.scheme, &requirement.network) {
                    *requirement = server.enhance_requirements(requirement.clone(), kind);
                }
            }
        }
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.resource_server.verify", skip_all, fields(scheme = %requirements.scheme, network = %requirements.network))
    )]
    pub async fn verify(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> VerificationResult {
        if let Err(err) = self
            .registry
            .lookup(&requirements.scheme, &requirements.network)
        {
            return VerificationResult::Invalid {
                kind: ErrorKind::UnsupportedScheme,
                reason: err.to_string(),
            };
        }
        let request = VerifyRequest::new(payload.clone(), requirements.clone());
        match self.facilitator.verify(&request).await {
            Ok(VerifyResponse::Valid { payer }) => VerificationResult::Valid { payer },
            Ok(VerifyResponse::Invalid { reason, .. }) => VerificationResult::Invalid {
                kind: ErrorKind::InvalidProof,
                reason,
            },
            Err(err) => VerificationResult::Invalid {
                kind: facilitator_failure("verify", &err),
                reason: err.to_string(),
            },
        }
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.resource_server.settle", skip_all, fields(scheme = %requirements.scheme, network = %requirements.network))
    )]
    pub async fn settle(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> SettlementResult {
        if let Err(err) = self
            .registry
            .lookup(&requirements.scheme, &requirements.network)
        {
            return SettlementResult::Failed {
                kind: ErrorKind::UnsupportedScheme,
                reason: err.to_string(),
            };
        }
        let request: SettleRequest = VerifyRequest::new(payload.clone(), requirements.clone());
        match self.facilitator.settle(&request).await {
            Ok(SettleResponse::Success {
                payer,
                transaction,
                network,
            }) => SettlementResult::Settled {
                transaction,
                payer,
                network,
            },
            Ok(SettleResponse::Error { reason, .. }) => SettlementResult::Failed {
                kind: ErrorKind::SettlementFailure,
                reason,
            },
            Err(err) => SettlementResult::Failed {
                kind: facilitator_failure("settle", &err),
                reason: err.to_string(),
            },
        }
    }
}

/// Logs a facilitator call that produced no answer and classifies it.
fn facilitator_failure<E: FacilitatorError>(call: &'static str, err: &E) -> ErrorKind {
    let failure = err.failure();
    if err.is_timeout() {
        tracing::warn!(call, error = %err, "Facilitator timed out");
    } else {
        tracing::warn!(call, %failure, error = %err, "Facilitator gave no answer");
    }
    ErrorKind::from(failure)
}
