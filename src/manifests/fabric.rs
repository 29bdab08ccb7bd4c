use serde::Deserialize;

use crate::error::ResolveError;

use super::get_json;

pub const META_URL: &str = "https://meta.fabricmc.net/v2/versions";

#[derive(Debug, Clone, Deserialize)]
pub struct FabricVersion {
    pub version: String,
    pub stable: bool,
}

/// Entries are listed newest first.
pub fn first_stable(versions: &[FabricVersion]) -> Option<&str> {
    versions.iter().find(|v| v.stable).map(|v| v.version.as_str())
}

pub fn server_jar_url(game: &str, loader: &str, installer: &str) -> String {
    format!("{META_URL}/loader/{game}/{loader}/{installer}/server/jar")
}

async fn list(client: &reqwest::Client, kind: &str) -> Result<Vec<FabricVersion>, ResolveError> {
    get_json(client, &format!("{META_URL}/{kind}")).await
}

async fn latest_stable(client: &reqwest::Client, kind: &str) -> Result<String, ResolveError> {
    let versions = list(client, kind).await?;
    first_stable(&versions)
        .map(str::to_string)
        .ok_or_else(|| ResolveError::VersionNotFound(format!("fabric {kind}")))
}

pub async fn game_versions(client: &reqwest::Client) -> Result<Vec<String>, ResolveError> {
    let stable: Vec<String> = list(client, "game")
        .await?
        .into_iter()
        .filter(|v| v.stable)
        .map(|v| v.version)
        .collect();
    if stable.is_empty() {
        return Err(ResolveError::VersionNotFound("fabric game".to_string()));
    }
    Ok(stable)
}

pub async fn resolve(client: &reqwest::Client, version: &str) -> Result<String, ResolveError> {
    let game = match version.trim() {
        "" | "latest" => latest_stable(client, "game").await?,
        other => other.to_string(),
    };
    let loader = latest_stable(client, "loader").await?;
    let installer = latest_stable(client, "installer").await?;
    Ok(server_jar_url(&game, &loader, &installer))
}
