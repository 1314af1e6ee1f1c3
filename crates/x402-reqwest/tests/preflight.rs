use alloy_primitives::U256;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use x402_reqwest::{Preflight, PreflightError, PreflightGate};
use x402_types::ledger::{ApprovalId, LedgerAccess, LedgerError};

const FAUCET: &str = "http://localhost:3001/";

/// Ledger that logs every operation in order.
#[derive(Debug, Default)]
struct ScriptedLedger {
    balance: U256,
    allowance: U256,
    revert: bool,
    log: Mutex<Vec<String>>,
}

impl ScriptedLedger {
    fn new(balance: u64, allowance: u64) -> Self {
        Self {
            balance: U256::from(balance),
            allowance: U256::from(allowance),
            ..Default::default()
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }
}

#[async_trait::async_trait]
impl LedgerAccess for ScriptedLedger {
    async fn balance(&self) -> Result<U256, LedgerError> {
        self.record("balance");
        Ok(self.balance)
    }

    async fn allowance(&self) -> Result<U256, LedgerError> {
        self.record("allowance");
        Ok(self.allowance)
    }

    async fn approve(&self, amount: U256) -> Result<ApprovalId, LedgerError> {
        self.record(format!("approve {amount}"));
        Ok("0xabc".into())
    }

    async fn await_confirmation(&self, approval: &ApprovalId) -> Result<(), LedgerError> {
        self.record(format!("confirm {approval}"));
        if self.revert {
            Err(LedgerError::Reverted(approval.clone()))
        } else {
            Ok(())
        }
    }
}

fn gate(ledger: Arc<ScriptedLedger>) -> PreflightGate {
    PreflightGate::new(ledger, FAUCET.parse().unwrap()).with_threshold(U256::from(1_000u64))
}

async fn protected_server(expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protected"))
        .respond_with(ResponseTemplate::new(402))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn empty_wallet_is_sent_to_the_faucet() {
    let server = protected_server(0).await;
    let ledger = Arc::new(ScriptedLedger::new(0, 5_000));
    let request = reqwest::Client::new().get(format!("{}/protected", server.uri()));

    let err = gate(ledger.clone()).send(request).await.unwrap_err();
    assert!(matches!(err, PreflightError::NoFunds { ref faucet_url } if faucet_url.as_str() == FAUCET));
    assert_eq!(ledger.log(), ["balance"]);
}

#[tokio::test]
async fn sufficient_allowance_goes_straight_through() {
    let server = protected_server(1).await;
    let ledger = Arc::new(ScriptedLedger::new(10, 1_001));
    let gate = gate(ledger.clone());

    assert_eq!(gate.check().await.unwrap(), Preflight::AlreadyApproved);
    let request = reqwest::Client::new().get(format!("{}/protected", server.uri()));
    let response = gate.send(request).await.unwrap();
    assert_eq!(response.status(), 402);
    assert!(ledger.log().iter().all(|op| !op.starts_with("approve")));
}

#[tokio::test]
async fn allowance_at_threshold_is_topped_up_before_the_call() {
    let server = protected_server(1).await;
    let ledger = Arc::new(ScriptedLedger::new(10, 1_000));

    assert_eq!(
        gate(ledger.clone()).check().await.unwrap(),
        Preflight::Approved("0xabc".into())
    );
    assert_eq!(
        ledger.log(),
        ["balance", "allowance", "approve 1000", "confirm 0xabc"]
    );

    let request = reqwest::Client::new().get(format!("{}/protected", server.uri()));
    gate(ledger).send(request).await.unwrap();
}

#[tokio::test]
async fn reverted_approval_blocks_the_call() {
    let server = protected_server(0).await;
    let ledger = Arc::new(ScriptedLedger {
        revert: true,
        ..ScriptedLedger::new(10, 0)
    });
    let request = reqwest::Client::new().get(format!("{}/protected", server.uri()));

    let err = gate(ledger).send(request).await.unwrap_err();
    assert!(matches!(err, PreflightError::Ledger(LedgerError::Reverted(id)) if id == "0xabc"));
}
