//! The seam between a resource server and whoever verifies and settles payments.
//!
//! The HTTP client in `x402-axum` is the usual implementation; tests substitute
//! an in-memory one.

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use crate::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};

/// Why a facilitator call produced no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilitatorFailure {
    /// Nothing came back within the configured bound.
    Timeout,
    /// The request never reached the facilitator.
    Unreachable,
    /// The facilitator answered with a status other than 200.
    Status(u16),
    /// A 200 whose body is not the expected JSON.
    InvalidResponse,
}

impl Display for FacilitatorFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FacilitatorFailure::Timeout => f.write_str("timeout"),
            FacilitatorFailure::Unreachable => f.write_str("unreachable"),
            FacilitatorFailure::Status(status) => write!(f, "status {status}"),
            FacilitatorFailure::InvalidResponse => f.write_str("invalid response"),
        }
    }
}

/// Error type of a [`Facilitator`], classified by [`FacilitatorFailure`].
pub trait FacilitatorError: Debug + Display {
    fn failure(&self) -> FacilitatorFailure;

    fn is_timeout(&self) -> bool {
        self.failure() == FacilitatorFailure::Timeout
    }
}

/// Verifies and settles payment proofs.
///
/// An `Err` means the facilitator could not give an answer (unreachable,
/// timed out, garbled). A definite "no" is `Ok(VerifyResponse::Invalid { .. })`
/// or `Ok(SettleResponse::Error { .. })`.
pub trait Facilitator {
    type Error: FacilitatorError;

    /// Checks a proof against the requirement it claims to satisfy.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Re-validates and executes the payment.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;

    /// Lists the scheme/network combinations the facilitator handles.
    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }
}
