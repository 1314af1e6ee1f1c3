#![allow(dead_code)]

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use x402_axum::{AcceptOption, ResourceServer, RouteConfig};
use x402_chain_eip155::register_exact_evm_scheme;
use x402_types::chain::ChainId;
use x402_types::facilitator::{Facilitator, FacilitatorError, FacilitatorFailure};
use x402_types::price::{AssetAmount, Price};
use x402_types::proto::{
    PaymentPayload, PaymentRequirements, SettleRequest, SettleResponse, SupportedPaymentKind,
    SupportedResponse, VerifyRequest, VerifyResponse, headers,
};
use x402_types::scheme::SchemeRegistry;
use x402_types::util::Base64Bytes;

pub const PAY_TO: &str = "0xc2983537C79A8f82ce6A7903Fe1F14D4761dBD17";
pub const XNY: &str = "0xc2983537C79A8f82ce6A7903Fe1F14D4761dBD17";
pub const PAYER: &str = "0x1111111111111111111111111111111111111111";

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

impl FacilitatorError for MockError {
    fn failure(&self) -> FacilitatorFailure {
        if self.0.contains("timed out") {
            FacilitatorFailure::Timeout
        } else {
            FacilitatorFailure::Unreachable
        }
    }
}

/// In-memory facilitator that records what it was asked.
#[derive(Debug)]
pub struct MockFacilitator {
    verify_response: Mutex<Result<VerifyResponse, String>>,
    settle_response: Mutex<Result<SettleResponse, String>>,
    supported: Mutex<Result<SupportedResponse, String>>,
    verify_calls: AtomicUsize,
    settle_requests: Mutex<Vec<SettleRequest>>,
}

impl Default for MockFacilitator {
    fn default() -> Self {
        Self {
            verify_response: Mutex::new(Ok(VerifyResponse::valid(PAYER))),
            settle_response: Mutex::new(Ok(SettleResponse::Success {
                payer: PAYER.into(),
                transaction: "0xfeed".into(),
                network: "eip155:84532".into(),
            })),
            supported: Mutex::new(Ok(SupportedResponse {
                kinds: vec![SupportedPaymentKind {
                    x402_version: 2,
                    scheme: "exact".into(),
                    network: "eip155:84532".into(),
                    extra: None,
                }],
                ..Default::default()
            })),
            verify_calls: AtomicUsize::new(0),
            settle_requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockFacilitator {
    pub fn set_verify(&self, response: Result<VerifyResponse, &str>) {
        *self.verify_response.lock().unwrap() = response.map_err(str::to_string);
    }

    pub fn set_settle(&self, response: Result<SettleResponse, &str>) {
        *self.settle_response.lock().unwrap() = response.map_err(str::to_string);
    }

    pub fn set_supported(&self, response: Result<SupportedResponse, &str>) {
        *self.supported.lock().unwrap() = response.map_err(str::to_string);
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn settle_calls(&self) -> usize {
        self.settle_requests.lock().unwrap().len()
    }

    pub fn settle_requests(&self) -> Vec<SettleRequest> {
        self.settle_requests.lock().unwrap().clone()
    }
}

impl Facilitator for MockFacilitator {
    type Error = MockError;

    async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResponse, MockError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_response.lock().unwrap().clone().map_err(MockError)
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, MockError> {
        self.settle_requests.lock().unwrap().push(request.clone());
        self.settle_response.lock().unwrap().clone().map_err(MockError)
    }

    async fn supported(&self) -> Result<SupportedResponse, MockError> {
        self.supported.lock().unwrap().clone().map_err(MockError)
    }
}

pub fn base_sepolia() -> ChainId {
    ChainId::new("eip155", "84532")
}

pub fn registry() -> Arc<SchemeRegistry> {
    let mut registry = SchemeRegistry::new();
    register_exact_evm_scheme(&mut registry);
    Arc::new(registry)
}

pub fn server(facilitator: Arc<MockFacilitator>) -> Arc<ResourceServer<Arc<MockFacilitator>>> {
    Arc::new(ResourceServer::new(registry(), facilitator))
}

/// The premium music route: 0.01 XNY on Base Sepolia.
pub fn xny_option() -> AcceptOption {
    AcceptOption::new(
        "exact",
        base_sepolia(),
        PAY_TO,
        Price::Asset(AssetAmount {
            amount: "10000000000000000".into(),
            asset: XNY.into(),
            extra: Some(json!({"name": "XNY", "version": "1"})),
        }),
    )
}

pub fn music_route() -> RouteConfig {
    RouteConfig::new(vec![xny_option()])
        .with_description("Premium music: x402 Remix")
        .with_mime_type("text/html")
}

/// The requirement `music_route` resolves to.
pub fn xny_requirements() -> PaymentRequirements {
    PaymentRequirements {
        scheme: "exact".into(),
        network: base_sepolia(),
        amount: "10000000000000000".into(),
        pay_to: PAY_TO.into(),
        max_timeout_seconds: 300,
        asset: XNY.into(),
        extra: Some(json!({"name": "XNY", "version": "1"})),
    }
}

pub fn payload_for(accepted: PaymentRequirements) -> PaymentPayload {
    serde_json::from_value(json!({
        "x402Version": 2,
        "accepted": accepted,
        "payload": {
            "signature": "0xdeadbeef",
            "authorization": {"from": PAYER, "to": PAY_TO, "value": "10000000000000000"}
        }
    }))
    .unwrap()
}

/// Header value carrying `payload`.
pub fn encode(payload: &PaymentPayload) -> String {
    Base64Bytes::encode_json(payload).unwrap().to_string()
}

pub fn paid_request(uri: &str, payload: &PaymentPayload) -> axum::extract::Request {
    axum::extract::Request::builder()
        .uri(uri)
        .header(headers::PAYMENT_SIGNATURE, encode(payload))
        .body(axum::body::Body::empty())
        .unwrap()
}

pub fn unpaid_request(uri: &str) -> axum::extract::Request {
    axum::extract::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

pub fn decode_header<T: serde::de::DeserializeOwned>(value: &http::HeaderValue) -> T {
    Base64Bytes::from(value.as_bytes()).decode_json().unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
