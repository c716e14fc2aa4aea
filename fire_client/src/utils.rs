//! Utility functions
//!
use reqwest::Client;

use crate::Error;

/// Download a file from a URL to a given filepath.
pub async fn download_file(
    client: &Client,
    url: &str,
    filepath: impl AsRef<std::path::Path>,
) -> Result<(), Error> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let content = resp.bytes().await?;
    tokio::fs::write(filepath.as_ref(), &content).await?;

    log::info!(
        "Saved {} ({} bytes) to {}",
        url,
        content.len(),
        filepath.as_ref().display()
    );

    Ok(())
}
