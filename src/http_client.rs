use anyhow::{Context, Result, ensure};
use reqwest::{Client, Response};
use std::time::Duration;

/// Create an HTTPS client for remote service communication
///
/// # Arguments
/// * `timeout` - Total timeout applied to every request
pub fn https_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .https_only(true)
        .build()
        .context("failed to create HTTPS client")
}

/// Handle HTTP response by checking status and extracting body
///
/// # Arguments
/// * `res` - The HTTP response to handle
/// * `context_msg` - Context message describing the request (e.g., "registry commit")
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err` - If the status is not successful or reading the body fails
pub async fn handle_http_response(res: Response, context_msg: &str) -> Result<String> {
    let status = res.status();
    let body = res.text().await.context("failed to read response body")?;

    ensure!(
        status.is_success(),
        "{context_msg} failed with status {status} and body: {body}"
    );

    Ok(body)
}
