use std::time::Duration;

use icehouse::tracing;

/// Query `/health` of a server listening on `port` of this host.
pub(crate) async fn health(port: u16) -> anyhow::Result<()> {
    let url = format!("http://localhost:{port}/health");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let response = client.get(&url).send().await.map_err(|e| {
        tracing::info!(%url, error = %e, "Health endpoint unreachable");
        anyhow::anyhow!("Health endpoint `{url}` unreachable: {e}")
    })?;
    let status = response.status();
    if status.is_success() {
        tracing::info!(%url, %status, "Server is healthy");
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Server is unhealthy ({status}): {body}")
    }
}
