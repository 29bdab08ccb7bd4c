//! Clients for the server-jar metadata APIs.

pub mod fabric;
pub mod paper;
pub mod vanilla;

use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::error::ResolveError;

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ResolveError> {
    let resp = checked_get(client, url).await?;
    resp.json::<T>()
        .await
        .map_err(|e| ResolveError::Network(e.to_string()))
}

/// Streams the body of `url` into `dest` chunk by chunk, returning the
/// number of bytes written.
pub(crate) async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, ResolveError> {
    let mut resp = checked_get(client, url).await?;
    let mut file = File::create(dest)
        .await
        .map_err(|e| ResolveError::Io(e.to_string()))?;

    let mut written = 0u64;
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| ResolveError::Network(e.to_string()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| ResolveError::Io(e.to_string()))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| ResolveError::Io(e.to_string()))?;
    Ok(written)
}

async fn checked_get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response, ResolveError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ResolveError::Network(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ResolveError::Http {
            status: resp.status().as_u16(),
            url: url.to_string(),
        });
    }
    Ok(resp)
}
