#![cfg(unix)]

use std::{
    os::unix::fs::PermissionsExt,
    path::Path,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use mcs_manager::{
    Bus, EventKind, InstanceStatus, JsonStore, Manager, ManagerError, MinecraftType, ResolveError,
    Resolver, ServerConfig, Settings, Subscription,
};
use tempfile::TempDir;
use tokio::time::timeout;

const STUB: &str = r#"#!/bin/sh
echo "[12:00:00] [Server thread/INFO]: Done (0.1s)! For help, type \"help\""
while read -r line; do
  case "$line" in
    stop) echo "[12:00:05] [Server thread/INFO]: Stopping the server"; exit 0 ;;
    *) echo "$line" ;;
  esac
done
"#;

/// Drops a placeholder jar in place of a download.
struct LocalJar;

#[async_trait]
impl Resolver for LocalJar {
    async fn ensure_artifact(&self, _config: &ServerConfig, dest: &Path) -> Result<(), ResolveError> {
        tokio::fs::write(dest, b"jar")
            .await
            .map_err(|e| ResolveError::Io(e.to_string()))
    }
}

async fn setup() -> (TempDir, Manager) {
    let dir = tempfile::tempdir().unwrap();
    let java = dir.path().join("java");
    std::fs::write(&java, STUB).unwrap();
    std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut settings = Settings::with_root(dir.path().join("servers"));
    settings.java = java;
    settings.status_host = "127.0.0.1".to_string();
    settings.status_timeout_ms = 200;
    settings.restart_timeout_secs = 5;

    let store = Arc::new(JsonStore::new(dir.path()));
    let manager = Manager::new(settings, Bus::new(), store, Arc::new(LocalJar))
        .await
        .unwrap();
    (dir, manager)
}

async fn wait_for(sub: &mut Subscription, kind: EventKind, id: &str) {
    timeout(Duration::from_secs(5), async {
        while let Some(event) = sub.recv().await {
            if event.is(kind, id) {
                return;
            }
        }
        panic!("bus closed");
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind} event for {id}"));
}

#[tokio::test]
async fn create_with_omitted_fields() {
    let (dir, manager) = setup().await;

    let config = ServerConfig {
        memory_mb: 0,
        port: 0,
        ..ServerConfig::new(MinecraftType::Vanilla, "")
    };
    let handle = manager.create(config).await.unwrap();

    let list = manager.list().await;
    assert_eq!(list.len(), 1);
    let info = &list[0];
    assert_eq!(info.config.id, handle.id());
    assert!(!info.config.id.is_empty());
    assert_eq!(info.config.version, "latest");
    assert_eq!(info.config.memory_mb, 2048);
    assert_ne!(info.config.port, 0);
    assert_eq!(info.state, InstanceStatus::Stopped);

    let raw = std::fs::read_to_string(dir.path().join("servers.json")).unwrap();
    assert!(raw.contains(&format!("\"id\": \"{}\"", handle.id())));
}

#[tokio::test]
async fn running_server_cannot_be_deleted() {
    let (_dir, manager) = setup().await;
    let handle = manager.create(ServerConfig::default()).await.unwrap();
    let id = handle.id().to_string();
    let mut sub = manager.bus().subscribe();

    handle.start().await.unwrap();
    let err = manager.delete(&id).await.unwrap_err();
    assert!(matches!(err, ManagerError::Running(_)), "{err:?}");
    assert!(manager.get(&id).await.is_some());

    handle.stop().await.unwrap();
    wait_for(&mut sub, EventKind::Exited, &id).await;
    assert_eq!(handle.status(), InstanceStatus::Stopped);

    manager.delete(&id).await.unwrap();
    assert!(manager.get(&id).await.is_none());
    assert!(manager.list().await.is_empty());
    assert!(!handle.config().path.exists());
}

#[tokio::test]
async fn restart_comes_back_with_new_process() {
    let (_dir, manager) = setup().await;
    let handle = manager.create(ServerConfig::default()).await.unwrap();
    let id = handle.id().to_string();
    let mut sub = manager.bus().subscribe();

    handle.start().await.unwrap();
    wait_for(&mut sub, EventKind::Started, &id).await;
    let before = handle.pid().await.unwrap();

    timeout(Duration::from_secs(3), handle.restart())
        .await
        .expect("restart took longer than 3s")
        .unwrap();

    assert_eq!(handle.status(), InstanceStatus::Running);
    let after = handle.pid().await.unwrap();
    assert_ne!(before, after);

    wait_for(&mut sub, EventKind::Exited, &id).await;
    wait_for(&mut sub, EventKind::Started, &id).await;

    handle.stop().await.unwrap();
    wait_for(&mut sub, EventKind::Exited, &id).await;
}
