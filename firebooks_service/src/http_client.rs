use anyhow::Context;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

/// Builds http client that opens a tracing span for every outgoing request
pub fn build_http_client() -> anyhow::Result<ClientWithMiddleware> {
    let reqwest_client = reqwest::Client::builder()
        .build()
        .context("Failed to build reqwest client")?;
    Ok(ClientBuilder::new(reqwest_client)
        // Insert the tracing middleware
        .with(TracingMiddleware::default())
        .build())
}
