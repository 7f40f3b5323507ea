//! Send a signed request to the example server.
//!
//! Usage: `perform_request [url]`. The secret comes from
//! `SIGNED_REQUESTS_SECRET` (default `development`).

use anyhow::Context;
use signed_requests::api_auth::RequestSigner;
use signed_requests::config::{AuthConfig, SECRET_ENV_VAR};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8765/example".to_string());
    let secret = std::env::var(SECRET_ENV_VAR).unwrap_or_else(|_| "development".to_string());

    let signer = RequestSigner::new(&AuthConfig::with_secret(secret))?;
    let body = serde_json::to_vec(&serde_json::json!({ "example": "data" }))?;
    let signed = signer.sign(&body);

    let response = reqwest::Client::new()
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .headers(signed.to_header_map()?)
        .body(body)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    println!("{}", response.status());
    println!("{}", response.text().await?);
    Ok(())
}
