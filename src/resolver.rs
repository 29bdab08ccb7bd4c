//! Acquisition of the runnable server jar.

use std::path::Path;

use async_trait::async_trait;

use crate::{config::ServerConfig, error::ResolveError};

/// Makes sure the jar for a configuration exists at `dest`.
///
/// Implementations must be idempotent: an existing `dest` is left alone.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn ensure_artifact(&self, config: &ServerConfig, dest: &Path) -> Result<(), ResolveError>;
}

#[cfg(feature = "resolver")]
pub use http::HttpResolver;

#[cfg(feature = "resolver")]
mod http {
    use std::path::Path;

    use async_trait::async_trait;
    use tokio::fs;
    use tracing::{debug, info};

    use super::Resolver;
    use crate::{
        config::{MinecraftType, ServerConfig},
        error::ResolveError,
        manifests::{self, fabric, paper, vanilla::{VanillaManifestV2, VanillaReleaseManifest}},
    };

    /// Resolves download URLs against the Mojang, PaperMC and Fabric APIs.
    #[derive(Debug, Clone)]
    pub struct HttpResolver {
        client: reqwest::Client,
    }

    impl HttpResolver {
        pub fn new() -> Result<Self, ResolveError> {
            let client = reqwest::Client::builder()
                .user_agent(concat!("mcs-manager/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| ResolveError::Network(e.to_string()))?;
            Ok(Self { client })
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        /// Download URL of the jar described by `config`.
        pub async fn resolve_url(&self, config: &ServerConfig) -> Result<String, ResolveError> {
            if let Some(url) = config.explicit_jar_url() {
                return Ok(url.to_string());
            }
            match config.mc_type {
                MinecraftType::Vanilla => {
                    let manifest = VanillaManifestV2::load(&self.client).await?;
                    let entry = manifest
                        .find(&config.version)
                        .ok_or_else(|| ResolveError::VersionNotFound(config.version.clone()))?;
                    let release = VanillaReleaseManifest::load(&self.client, entry).await?;
                    release
                        .server_url()
                        .map(str::to_string)
                        .ok_or_else(|| ResolveError::NoBuilds(entry.id.clone()))
                }
                MinecraftType::Paper => paper::resolve(&self.client, &config.version).await,
                MinecraftType::Fabric => fabric::resolve(&self.client, &config.version).await,
                MinecraftType::Custom => Err(ResolveError::MissingUrl(MinecraftType::Custom)),
            }
        }

        /// Release versions offered for a server type, newest first for vanilla.
        pub async fn versions(&self, mc_type: MinecraftType) -> Result<Vec<String>, ResolveError> {
            match mc_type {
                MinecraftType::Vanilla => Ok(VanillaManifestV2::load(&self.client).await?.releases()),
                MinecraftType::Paper => paper::versions(&self.client).await,
                MinecraftType::Fabric => fabric::game_versions(&self.client).await,
                MinecraftType::Custom => Ok(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Resolver for HttpResolver {
        async fn ensure_artifact(&self, config: &ServerConfig, dest: &Path) -> Result<(), ResolveError> {
            if fs::try_exists(dest).await.unwrap_or(false) {
                debug!(path = %dest.display(), "jar already present");
                return Ok(());
            }

            let url = self.resolve_url(config).await?;
            info!(id = %config.id, %url, "downloading server jar");

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ResolveError::Io(e.to_string()))?;
            }
            let tmp = dest.with_extension("jar.part");
            let bytes = match manifests::download(&self.client, &url, &tmp).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(err);
                }
            };
            debug!(id = %config.id, bytes, "download complete");

            fs::rename(&tmp, dest)
                .await
                .map_err(|e| ResolveError::Io(e.to_string()))
        }
    }

    #[cfg(test)]
    mod tests {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        use super::*;

        /// Answers one request with `status` and `body`, then closes.
        async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                for part in body.chunks(8192) {
                    socket.write_all(part).await.unwrap();
                }
                socket.shutdown().await.unwrap();
            });
            format!("http://{addr}/server.jar")
        }

        fn resolver() -> HttpResolver {
            HttpResolver::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
        }

        fn custom(url: String) -> ServerConfig {
            ServerConfig {
                id: "custom".to_string(),
                mc_type: MinecraftType::Custom,
                jar_url: Some(url),
                ..ServerConfig::default()
            }
        }

        #[tokio::test]
        async fn explicit_url_is_streamed_to_dest() {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("server.jar");
            let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
            let url = serve_once("200 OK", body.clone()).await;

            let resolver = resolver();
            resolver.ensure_artifact(&custom(url), &dest).await.unwrap();

            assert_eq!(std::fs::read(&dest).unwrap(), body);
            assert!(!dir.path().join("server.jar.part").exists());

            // Present already: nothing is fetched.
            resolver
                .ensure_artifact(&custom("http://127.0.0.1:1/none".to_string()), &dest)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn http_error_leaves_no_file() {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("server.jar");
            let url = serve_once("404 Not Found", b"missing".to_vec()).await;

            let err = resolver()
                .ensure_artifact(&custom(url), &dest)
                .await
                .unwrap_err();
            assert!(matches!(err, ResolveError::Http { status: 404, .. }), "{err:?}");
            assert!(!dest.exists());
            assert!(!dir.path().join("server.jar.part").exists());
        }

        #[tokio::test]
        async fn custom_without_url_is_rejected() {
            let config = ServerConfig {
                mc_type: MinecraftType::Custom,
                ..ServerConfig::default()
            };
            let err = resolver().resolve_url(&config).await.unwrap_err();
            assert!(matches!(err, ResolveError::MissingUrl(MinecraftType::Custom)));
        }
    }
}
