use serde::Deserialize;

use crate::error::ResolveError;

use super::get_json;

pub const MANIFEST_URL: &str = "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaManifestV2 {
    pub latest: Latest,
    pub versions: Vec<VanillaManifestV2Version>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Latest {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaManifestV2Version {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl VanillaManifestV2 {
    pub async fn load(client: &reqwest::Client) -> Result<Self, ResolveError> {
        get_json(client, MANIFEST_URL).await
    }

    /// Looks up a version id; empty, `latest` and `release` mean the newest
    /// release, `snapshot` the newest snapshot.
    pub fn find(&self, version: &str) -> Option<&VanillaManifestV2Version> {
        let id = match version.trim() {
            "" | "latest" | "release" => self.latest.release.as_str(),
            "snapshot" => self.latest.snapshot.as_str(),
            other => other,
        };
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn releases(&self) -> Vec<String> {
        self.versions
            .iter()
            .filter(|v| v.kind == "release")
            .map(|v| v.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaReleaseManifest {
    downloads: Downloads,
}

#[derive(Debug, Clone, Deserialize)]
struct Downloads {
    server: Option<Download>,
}

#[derive(Debug, Clone, Deserialize)]
struct Download {
    url: String,
}

impl VanillaReleaseManifest {
    pub async fn load(
        client: &reqwest::Client,
        version: &VanillaManifestV2Version,
    ) -> Result<Self, ResolveError> {
        get_json(client, &version.url).await
    }

    /// `None` for versions that never shipped a server jar.
    pub fn server_url(&self) -> Option<&str> {
        self.downloads.server.as_ref().map(|d| d.url.as_str())
    }
}
