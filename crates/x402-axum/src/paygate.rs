//! The per-request payment state machine.
//!
//! A [`Paygate`] is built for each request that hits a protected route and
//! consumed by [`Paygate::handle_request`]:
//!
//! 1. No payment header: 402 challenge, or the HTML paywall for browsers.
//! 2. Header present: decode it, pick the first route requirement the proof
//!    refers to, and verify it with the facilitator.
//! 3. Valid proof: run the protected handler once with the untouched request.
//! 4. Handler status below 400: settle once and attach the receipt as
//!    `PAYMENT-RESPONSE`. A failed settlement is logged; the response stands.
//!
//! Settlement runs inside the request future. If the connection goes away
//! and the future is dropped before that point, nothing is settled.

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use std::convert::Infallible;
use std::sync::Arc;
use tower::{Service, ServiceExt};
use x402_types::facilitator::Facilitator;
use x402_types::proto::{
    PaymentPayload, PaymentRequirements, ResourceInfo, SettleResponse, headers,
};
use x402_types::util::Base64Bytes;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, instrument};

use crate::errors::{ErrorKind, error_response, json_response};
use crate::paywall::{Paywall, is_browser_request};
use crate::resource_server::{ResourceServer, SettlementResult, VerificationResult};
use crate::route::ProtectedRoute;
use crate::settlement::should_settle;

/// Why a request did not reach the protected handler.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    #[error("{} header is required", headers::PAYMENT_SIGNATURE)]
    PaymentRequired,
    #[error("Invalid or malformed payment header")]
    InvalidPaymentHeader,
    #[error("No accepted payment option matches {scheme} on {network}")]
    NoMatchingRequirement { scheme: String, network: String },
    #[error("{reason}")]
    Verification { kind: ErrorKind, reason: String },
}

impl PaygateError {
    /// `None` for a plain request without any proof.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PaygateError::PaymentRequired => None,
            PaygateError::InvalidPaymentHeader => Some(ErrorKind::InvalidPaymentHeader),
            PaygateError::NoMatchingRequirement { .. } => Some(ErrorKind::NoMatchingRequirement),
            PaygateError::Verification { kind, .. } => Some(*kind),
        }
    }
}

/// Everything needed to gate one request.
pub struct Paygate<F> {
    pub server: Arc<ResourceServer<F>>,
    pub route: Arc<ProtectedRoute>,
    pub resource: ResourceInfo,
    pub paywall: Option<Paywall>,
}

impl<F> Paygate<F>
where
    F: Facilitator + Send + Sync,
{
    /// Runs the request through the gate. Failures become HTTP responses.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.handle_request", skip_all, fields(url = %self.resource.url))
    )]
    pub async fn handle_request<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        let is_browser = is_browser_request(req.headers());
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => {
                tracing::debug!(error = %err, "Payment not accepted");
                Ok(self.error_into_response(err, is_browser))
            }
        }
    }

    async fn handle_request_fallible<S>(
        &self,
        inner: S,
        req: Request,
    ) -> Result<Response, PaygateError>
    where
        S: Service<Request, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        let header = extract_payment_header(req.headers()).ok_or(PaygateError::PaymentRequired)?;
        let payload: PaymentPayload = Base64Bytes::from(header)
            .decode_json()
            .map_err(|_| PaygateError::InvalidPaymentHeader)?;
        let requirements = self.route.find_requirement(&payload.accepted).ok_or_else(|| {
            PaygateError::NoMatchingRequirement {
                scheme: payload.accepted.scheme.clone(),
                network: payload.accepted.network.to_string(),
            }
        })?;

        match self.server.verify(requirements, &payload).await {
            VerificationResult::Valid { payer } => {
                tracing::debug!(%payer, "Payment verified");
            }
            VerificationResult::Invalid { kind, reason } => {
                return Err(PaygateError::Verification { kind, reason });
            }
        }

        let response = call_inner(inner, req).await;
        if !should_settle(response.status()) {
            tracing::debug!(status = %response.status(), "Handler failed, payment not settled");
            return Ok(response);
        }

        let settlement = self.server.settle(requirements, &payload).await;
        Ok(attach_settlement(response, settlement, requirements))
    }

    fn error_into_response(&self, err: PaygateError, is_browser: bool) -> Response {
        let kind = err.kind();
        if let Some(kind) = kind.filter(|kind| !kind.is_rechallenge()) {
            return error_response(kind, &err.to_string());
        }
        let error = kind.map(|_| err.to_string());
        let payment_required = self
            .route
            .payment_required(self.resource.clone(), error);
        let encoded = Base64Bytes::encode_json(&payment_required).ok();

        let mut response = match (&self.paywall, kind) {
            (Some(paywall), None) if is_browser => {
                let mut response = Response::new(Body::from(paywall.render(&payment_required)));
                *response.status_mut() = StatusCode::PAYMENT_REQUIRED;
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                response
            }
            _ => json_response(
                StatusCode::PAYMENT_REQUIRED,
                serde_json::to_vec(&payment_required).unwrap_or_default(),
            ),
        };
        if let Some(value) = encoded.and_then(|b64| HeaderValue::from_bytes(b64.as_ref()).ok()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static("payment-required"), value);
        }
        response
    }
}

/// The proof header, preferring `PAYMENT-SIGNATURE` over legacy `X-PAYMENT`.
pub fn extract_payment_header(header_map: &HeaderMap) -> Option<&[u8]> {
    header_map
        .get(headers::PAYMENT_SIGNATURE)
        .or_else(|| header_map.get(headers::X_PAYMENT))
        .map(|value| value.as_bytes())
}

async fn call_inner<S>(inner: S, req: Request) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible> + Send,
    S::Future: Send,
{
    let fut = inner.oneshot(req);
    #[cfg(feature = "telemetry")]
    let fut = fut.instrument(tracing::info_span!("inner"));
    match fut.await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// Adds the `PAYMENT-RESPONSE` receipt for the settlement outcome.
fn attach_settlement(
    mut response: Response,
    settlement: SettlementResult,
    requirements: &PaymentRequirements,
) -> Response {
    let receipt = match settlement {
        SettlementResult::Settled {
            transaction,
            payer,
            network,
        } => {
            tracing::info!(%transaction, %payer, %network, "Payment settled");
            SettleResponse::Success {
                payer,
                transaction,
                network,
            }
        }
        SettlementResult::Failed { kind, reason } => {
            tracing::warn!(?kind, %reason, "Settlement failed, returning response anyway");
            SettleResponse::Error {
                reason,
                payer: None,
                network: requirements.network.to_string(),
            }
        }
    };
    let header = Base64Bytes::encode_json(&receipt)
        .ok()
        .and_then(|b64| HeaderValue::from_bytes(b64.as_ref()).ok());
    if let Some(value) = header {
        response
            .headers_mut()
            .insert(HeaderName::from_static("payment-response"), value);
    }
    response
}
