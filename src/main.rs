//! x402 Gate HTTP entrypoint.
//!
//! A demo resource server whose content is paid for with x402:
//!
//! - `GET /protected` – premium HTML page, guarded by the path-matching proxy
//! - `GET /api/weather` – JSON weather report, guarded by a per-route layer
//!
//! Both are verified through the configured facilitator and settled only
//! after the handler responded successfully.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `FACILITATOR_URL`, `EVM_ADDRESS` referenced from the config file
//! - `APP_NAME`, `APP_LOGO` brand the browser paywall
//! - `HOST`, `PORT` control binding address
//! - `OTEL_*` variables enable tracing to systems like Honeycomb

mod config;
mod handlers;
mod run;
mod sig_down;
mod telemetry;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
