//! Failure taxonomy of the payment gate.
//!
//! [`ConfigurationError`] happens while routes are built and stops startup.
//! [`ErrorKind`] classifies per-request failures; each one except
//! [`ErrorKind::SettlementFailure`] becomes a structured HTTP response at the
//! gateway boundary.

use axum_core::body::Body;
use axum_core::response::Response;
use http::{HeaderValue, StatusCode, header};
use serde::Serialize;
use x402_types::chain::ChainId;
use x402_types::facilitator::FacilitatorFailure;
use x402_types::scheme::{SchemeError, UnsupportedScheme};

/// Why a request was not served, or why its payment was not collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The proof names a scheme/network/asset the route does not accept.
    NoMatchingRequirement,
    /// The facilitator looked at the proof and rejected it.
    InvalidProof,
    /// The payment header is not base64 JSON of a version 2 payload.
    InvalidPaymentHeader,
    /// No scheme server is registered for a requirement; server misconfiguration.
    UnsupportedScheme,
    /// The facilitator could not be reached or gave no usable answer.
    FacilitatorUnavailable,
    /// Settlement did not go through after the response was produced.
    SettlementFailure,
}

impl ErrorKind {
    /// HTTP status the gateway answers with, `None` for failures that do not
    /// replace the response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ErrorKind::NoMatchingRequirement
            | ErrorKind::InvalidProof
            | ErrorKind::InvalidPaymentHeader => Some(StatusCode::PAYMENT_REQUIRED),
            ErrorKind::UnsupportedScheme => Some(StatusCode::BAD_REQUEST),
            ErrorKind::FacilitatorUnavailable => Some(StatusCode::SERVICE_UNAVAILABLE),
            ErrorKind::SettlementFailure => None,
        }
    }

    /// Whether the answer is a fresh 402 challenge.
    pub fn is_rechallenge(&self) -> bool {
        self.status() == Some(StatusCode::PAYMENT_REQUIRED)
    }
}

impl From<FacilitatorFailure> for ErrorKind {
    /// A facilitator without an answer is unavailable, whatever the cause.
    fn from(failure: FacilitatorFailure) -> Self {
        match failure {
            FacilitatorFailure::Timeout
            | FacilitatorFailure::Unreachable
            | FacilitatorFailure::Status(_)
            | FacilitatorFailure::InvalidResponse => ErrorKind::FacilitatorUnavailable,
        }
    }
}

/// A route that cannot be served as configured.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    UnsupportedScheme(#[from] UnsupportedScheme),
    #[error("Invalid price for scheme {scheme} on {network}: {source}")]
    InvalidPrice {
        scheme: String,
        network: ChainId,
        #[source]
        source: SchemeError,
    },
    #[error("Invalid payTo for scheme {scheme} on {network}: {source}")]
    InvalidPayTo {
        scheme: String,
        network: ChainId,
        #[source]
        source: SchemeError,
    },
    #[error("Invalid asset for scheme {scheme} on {network}: {source}")]
    InvalidAsset {
        scheme: String,
        network: ChainId,
        #[source]
        source: SchemeError,
    },
    #[error("Route {0} accepts no payment options")]
    EmptyAccepts(String),
    #[error("Invalid route pattern {pattern}: {reason}")]
    InvalidRoutePattern { pattern: String, reason: &'static str },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorKind,
    message: &'a str,
}

/// JSON `{ "error": <kind>, "message": <reason> }` with the kind's status.
pub(crate) fn error_response(kind: ErrorKind, message: &str) -> Response {
    let status = kind.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_vec(&ErrorBody {
        error: kind,
        message,
    })
    .unwrap_or_default();
    json_response(status, body)
}

pub(crate) fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
