mod common;

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::routing::{get, post};
use common::*;
use http::{HeaderMap, Method, StatusCode, Uri, header};
use serde_json::json;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use x402_axum::facilitator_client::FacilitatorClient;
use x402_axum::paygate::Paygate;
use x402_axum::{
    AcceptOption, BasicPaywall, Paywall, PaywallConfig, ResourceServer, RouteConfig,
    X402Middleware,
};
use x402_types::chain::ChainId;
use x402_types::price::Price;
use x402_types::proto::{PaymentRequired, SettleResponse, VerifyResponse, headers};
use x402_types::scheme::SchemeRegistry;

struct App {
    router: Router,
    facilitator: Arc<MockFacilitator>,
    handled: Arc<AtomicUsize>,
}

fn app_with(route: RouteConfig, status: StatusCode) -> App {
    let facilitator = Arc::new(MockFacilitator::default());
    let handled = Arc::new(AtomicUsize::new(0));
    let x402 = X402Middleware::new(server(facilitator.clone()))
        .with_paywall(Paywall::new(BasicPaywall, PaywallConfig::default()));
    let layer = x402.with_route(&route).unwrap();
    let counter = handled.clone();
    let handler = get(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (status, "Premium content")
        }
    });
    App {
        router: Router::new().route("/protected", handler.layer(layer)),
        facilitator,
        handled,
    }
}

fn app() -> App {
    app_with(music_route(), StatusCode::OK)
}

#[tokio::test]
async fn request_without_proof_is_challenged() {
    let app = app();
    let response = app
        .router
        .oneshot(unpaid_request("/protected"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let from_header: PaymentRequired = decode_header(&response.headers()[headers::PAYMENT_REQUIRED]);
    let body = body_json(response).await;
    assert_eq!(body, serde_json::to_value(&from_header).unwrap());
    assert_eq!(body["x402Version"], 2);
    assert_eq!(body["accepts"], json!([xny_requirements()]));
    assert_eq!(body["resource"]["description"], "Premium music: x402 Remix");
    assert_eq!(body["resource"]["mimeType"], "text/html");
    assert!(body["resource"]["url"].as_str().unwrap().ends_with("/protected"));
    assert_eq!(app.handled.load(Ordering::SeqCst), 0);
    assert_eq!(app.facilitator.verify_calls(), 0);
    assert_eq!(app.facilitator.settle_calls(), 0);
}

#[tokio::test]
async fn valid_proof_is_served_and_settled_once() {
    let app = app();
    let payload = payload_for(xny_requirements());
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let receipt: SettleResponse = decode_header(&response.headers()[headers::PAYMENT_RESPONSE]);
    assert_eq!(
        receipt,
        SettleResponse::Success {
            payer: PAYER.into(),
            transaction: "0xfeed".into(),
            network: "eip155:84532".into(),
        }
    );
    assert_eq!(body_text(response).await, "Premium content");
    assert_eq!(app.handled.load(Ordering::SeqCst), 1);
    assert_eq!(app.facilitator.verify_calls(), 1);

    let settled = app.facilitator.settle_requests();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].payment_requirements, xny_requirements());
    assert_eq!(settled[0].payment_payload, payload);
}

#[tokio::test]
async fn failed_handler_is_not_settled() {
    let app = app_with(music_route(), StatusCode::NOT_FOUND);
    let payload = payload_for(xny_requirements());
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(headers::PAYMENT_RESPONSE).is_none());
    assert_eq!(app.handled.load(Ordering::SeqCst), 1);
    assert_eq!(app.facilitator.verify_calls(), 1);
    assert_eq!(app.facilitator.settle_calls(), 0);
}

#[tokio::test]
async fn proof_for_other_network_gets_fresh_challenge() {
    let app = app();
    let mut accepted = xny_requirements();
    accepted.network = ChainId::new("solana", "EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload_for(accepted)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["accepts"], json!([xny_requirements()]));
    assert_eq!(body["accepts"][0]["network"], "eip155:84532");
    assert!(body["error"].as_str().unwrap().contains("solana"));
    assert_eq!(app.facilitator.verify_calls(), 0);
    assert_eq!(app.handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_header_is_rejected() {
    let app = app();
    let request = axum::extract::Request::builder()
        .uri("/protected")
        .header(headers::PAYMENT_SIGNATURE, "definitely-not-base64-json")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid or malformed payment header");
    assert_eq!(app.facilitator.verify_calls(), 0);
}

#[tokio::test]
async fn legacy_header_is_accepted() {
    let app = app();
    let request = axum::extract::Request::builder()
        .uri("/protected")
        .header(headers::X_PAYMENT, encode(&payload_for(xny_requirements())))
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.facilitator.settle_calls(), 1);
}

#[tokio::test]
async fn invalid_proof_is_rechallenged() {
    let app = app();
    app.facilitator.set_verify(Ok(VerifyResponse::invalid(
        Some(PAYER.into()),
        "invalid_exact_evm_payload_signature",
    )));
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload_for(xny_requirements())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(response.headers().contains_key(headers::PAYMENT_REQUIRED));
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_exact_evm_payload_signature");
    assert_eq!(body["accepts"], json!([xny_requirements()]));
    assert_eq!(app.handled.load(Ordering::SeqCst), 0);
    assert_eq!(app.facilitator.settle_calls(), 0);
}

#[tokio::test]
async fn unreachable_facilitator_is_503() {
    let app = app();
    app.facilitator.set_verify(Err("connection refused"));
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload_for(xny_requirements())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "facilitator_unavailable");
    assert_eq!(body["message"], "connection refused");
    assert_eq!(app.handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_settlement_keeps_response() {
    let app = app();
    app.facilitator.set_settle(Ok(SettleResponse::Error {
        reason: "insufficient_funds".into(),
        payer: None,
        network: "eip155:84532".into(),
    }));
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload_for(xny_requirements())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let receipt: serde_json::Value = decode_header(&response.headers()[headers::PAYMENT_RESPONSE]);
    assert_eq!(receipt["success"], false);
    assert_eq!(receipt["errorReason"], "insufficient_funds");
    assert_eq!(body_text(response).await, "Premium content");
    assert_eq!(app.facilitator.settle_calls(), 1);
}

#[tokio::test]
async fn facilitator_down_at_settlement_keeps_response() {
    let app = app();
    app.facilitator.set_settle(Err("timed out"));
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload_for(xny_requirements())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.handled.load(Ordering::SeqCst), 1);
    assert_eq!(app.facilitator.settle_calls(), 1);
}

#[tokio::test]
async fn first_matching_accept_entry_is_used() {
    let route = RouteConfig::new(vec![
        xny_option(),
        AcceptOption::new("exact", base_sepolia(), PAY_TO, Price::from("$0.01")),
    ]);
    let app = app_with(route, StatusCode::OK);
    let mut accepted = xny_requirements();
    accepted.asset = "0x036cbd53842c5426634e7929541ec2318f3dcf7e".into();
    let response = app
        .router
        .oneshot(paid_request("/protected", &payload_for(accepted)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let settled = app.facilitator.settle_requests();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].payment_requirements.amount, "10000");
    assert_eq!(
        settled[0].payment_requirements.asset,
        "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
    );
}

#[tokio::test]
async fn repeated_proof_is_verified_each_time() {
    let app = app();
    let payload = payload_for(xny_requirements());
    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(paid_request("/protected", &payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(app.facilitator.verify_calls(), 2);
    assert_eq!(app.facilitator.settle_calls(), 2);
    assert_eq!(app.handled.load(Ordering::SeqCst), 2);
}

/// What the protected handler received.
#[derive(Debug, Clone)]
struct Received {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

#[tokio::test]
async fn handler_gets_the_request_as_sent() {
    let x402 = X402Middleware::new(server(Arc::new(MockFacilitator::default())));
    let received: Arc<Mutex<Option<Received>>> = Arc::default();
    let sink = received.clone();
    let handler = post(move |request: axum::extract::Request| {
        let sink = sink.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            *sink.lock().unwrap() = Some(Received {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            });
            "Premium content"
        }
    });
    let router = Router::new().route(
        "/protected",
        handler.layer(x402.with_route(&music_route()).unwrap()),
    );

    let proof = encode(&payload_for(xny_requirements()));
    let request = axum::extract::Request::builder()
        .method(Method::POST)
        .uri("/protected?track=7")
        .header(headers::PAYMENT_SIGNATURE, proof.as_str())
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-client", "remix-app")
        .body(Body::from(r#"{"quality":"lossless"}"#))
        .unwrap();
    let sent_headers = request.headers().clone();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = received.lock().unwrap().clone().expect("handler ran");
    assert_eq!(received.method, Method::POST);
    assert_eq!(received.uri, "/protected?track=7");
    assert_eq!(received.headers, sent_headers);
    assert_eq!(received.headers[headers::PAYMENT_SIGNATURE], proof.as_str());
    assert_eq!(&received.body[..], br#"{"quality":"lossless"}"#);
}

#[tokio::test]
async fn browsers_get_the_paywall() {
    let app = app();
    let request = axum::extract::Request::builder()
        .uri("/protected")
        .header(header::ACCEPT, "text/html,application/xhtml+xml")
        .header(header::USER_AGENT, "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0)")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let html = body_text(response).await;
    assert!(html.contains("Premium music: x402 Remix"));
    assert!(html.contains("eip155:84532"));
}

#[tokio::test]
async fn unregistered_scheme_at_request_time_is_400() {
    let facilitator = Arc::new(MockFacilitator::default());
    let route = server(facilitator.clone())
        .build_route("/protected", &music_route())
        .unwrap();
    let empty = Arc::new(ResourceServer::new(
        Arc::new(SchemeRegistry::new()),
        facilitator.clone(),
    ));
    let gate = Paygate {
        server: empty,
        resource: route.resource.as_resource_info(None, &unpaid_request("/protected")),
        route: Arc::new(route),
        paywall: None,
    };
    let inner = tower::service_fn(|_req: axum::extract::Request| async {
        Ok::<_, Infallible>(axum::response::Response::new(Body::from("served")))
    });
    let response = gate
        .handle_request(inner, paid_request("/protected", &payload_for(xny_requirements())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "unsupported_scheme");
    assert_eq!(facilitator.verify_calls(), 0);
}

#[tokio::test]
async fn slow_remote_facilitator_is_503() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"isValid": true, "payer": PAYER}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "payer": PAYER, "transaction": "0x01", "network": "eip155:84532"
        })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let facilitator = FacilitatorClient::try_from(mock_server.uri().as_str())
        .unwrap()
        .with_timeout(Duration::from_millis(50));
    let x402 = X402Middleware::new(Arc::new(ResourceServer::new(registry(), facilitator)));
    let router = Router::new().route(
        "/protected",
        get(|| async { "Premium content" }).layer(x402.with_route(&music_route()).unwrap()),
    );
    let response = router
        .oneshot(paid_request("/protected", &payload_for(xny_requirements())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "facilitator_unavailable");
}
