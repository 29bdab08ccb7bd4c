use serde::Deserialize;

use crate::error::ResolveError;

use super::get_json;

pub const PROJECT_URL: &str = "https://api.papermc.io/v2/projects/paper";

#[derive(Debug, Clone, Deserialize)]
pub struct PaperProject {
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperBuilds {
    pub builds: Vec<PaperBuild>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperBuild {
    pub build: u32,
    downloads: PaperDownloads,
}

#[derive(Debug, Clone, Deserialize)]
struct PaperDownloads {
    application: PaperApplication,
}

#[derive(Debug, Clone, Deserialize)]
struct PaperApplication {
    name: String,
}

impl PaperProject {
    /// The newest version is listed last.
    pub fn latest(&self) -> Option<&str> {
        self.versions.last().map(String::as_str)
    }
}

impl PaperBuilds {
    /// Download URL of the newest build of `version`.
    pub fn latest_url(&self, version: &str) -> Option<String> {
        let build = self.builds.last()?;
        Some(format!(
            "{PROJECT_URL}/versions/{version}/builds/{}/downloads/{}",
            build.build, build.downloads.application.name
        ))
    }
}

pub async fn versions(client: &reqwest::Client) -> Result<Vec<String>, ResolveError> {
    let project: PaperProject = get_json(client, PROJECT_URL).await?;
    if project.versions.is_empty() {
        return Err(ResolveError::VersionNotFound("paper".to_string()));
    }
    Ok(project.versions)
}

pub async fn resolve(client: &reqwest::Client, version: &str) -> Result<String, ResolveError> {
    let version = match version.trim() {
        "" | "latest" => {
            let project: PaperProject = get_json(client, PROJECT_URL).await?;
            project
                .latest()
                .ok_or_else(|| ResolveError::VersionNotFound("paper".to_string()))?
                .to_string()
        }
        other => other.to_string(),
    };

    let builds: PaperBuilds = get_json(client, &format!("{PROJECT_URL}/versions/{version}/builds")).await?;
    builds
        .latest_url(&version)
        .ok_or(ResolveError::NoBuilds(version))
}
