//! The paid resources. Payment is handled by the layers in front of them.

use axum::Json;
use axum::response::{Html, IntoResponse};
use serde_json::json;
use tracing::instrument;

/// `GET /protected`: the premium page.
#[instrument(skip_all)]
pub async fn get_protected() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>x402 Remix</title></head>
<body>
<h1>Premium music: x402 Remix</h1>
<p>Payment settled. Enjoy the track.</p>
<audio controls src="/x402-remix.mp3"></audio>
</body>
</html>"#,
    )
}

/// `GET /api/weather`: a fixed weather report.
#[instrument(skip_all)]
pub async fn get_weather() -> impl IntoResponse {
    Json(json!({
        "report": {
            "weather": "sunny",
            "temperature": 72,
        }
    }))
}
