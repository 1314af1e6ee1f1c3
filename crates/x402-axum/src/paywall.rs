//! HTML shown to browsers instead of the JSON 402 challenge.
//!
//! Wallet integration is up to the [`PaywallProvider`]; [`BasicPaywall`] only
//! tells a human what the resource costs.

use http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use x402_types::proto::PaymentRequired;

/// Branding passed to the paywall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaywallConfig {
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_logo: Option<String>,
    #[serde(default)]
    pub testnet: bool,
}

impl Default for PaywallConfig {
    fn default() -> Self {
        Self {
            app_name: "x402 Gate".to_string(),
            app_logo: None,
            testnet: true,
        }
    }
}

/// Renders a full HTML document for a 402 challenge.
pub trait PaywallProvider: Send + Sync {
    fn render(&self, payment_required: &PaymentRequired, config: &PaywallConfig) -> String;
}

/// A provider together with the branding it renders with.
#[derive(Clone)]
pub struct Paywall {
    provider: Arc<dyn PaywallProvider>,
    config: PaywallConfig,
}

impl Paywall {
    pub fn new<P: PaywallProvider + 'static>(provider: P, config: PaywallConfig) -> Self {
        Self {
            provider: Arc::new(provider),
            config,
        }
    }

    pub fn config(&self) -> &PaywallConfig {
        &self.config
    }

    pub fn render(&self, payment_required: &PaymentRequired) -> String {
        self.provider.render(payment_required, &self.config)
    }
}

impl fmt::Debug for Paywall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paywall")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A plain page listing the accepted payment options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPaywall;

impl PaywallProvider for BasicPaywall {
    fn render(&self, payment_required: &PaymentRequired, config: &PaywallConfig) -> String {
        let resource = &payment_required.resource;
        let logo = config
            .app_logo
            .as_deref()
            .map(|logo| format!(r#"<img src="{}" alt="" height="48">"#, escape(logo)))
            .unwrap_or_default();
        let banner = if config.testnet {
            "<p><em>Testnet: no real funds are moved.</em></p>"
        } else {
            ""
        };
        let options: String = payment_required
            .accepts
            .iter()
            .map(|requirement| {
                format!(
                    "<li>{} {} of <code>{}</code> on {} to <code>{}</code></li>",
                    escape(&requirement.scheme),
                    escape(&requirement.amount),
                    escape(&requirement.asset),
                    escape(&requirement.network.to_string()),
                    escape(&requirement.pay_to),
                )
            })
            .collect();
        let error = payment_required
            .error
            .as_deref()
            .map(|error| format!("<p><strong>{}</strong></p>", escape(error)))
            .unwrap_or_default();
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Payment Required | {app}</title></head>
<body>
{logo}
<h1>{app}</h1>
<p>{description}</p>
{banner}{error}
<p>Payment is required to access <code>{url}</code>:</p>
<ul>{options}</ul>
</body>
</html>
"#,
            app = escape(&config.app_name),
            description = escape(&resource.description),
            url = escape(&resource.url),
        )
    }
}

/// A browser navigation, as opposed to an API client.
pub fn is_browser_request(headers: &HeaderMap) -> bool {
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));
    let is_mozilla = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("Mozilla"));
    accepts_html && is_mozilla
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
