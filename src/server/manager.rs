use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::Arc,
};

use tokio::{
    fs,
    sync::{Mutex, RwLock},
};
use tracing::{debug, info, warn};

use crate::{
    config::{
        DEFAULT_MEMORY_MB, DEFAULT_VERSION, EULA_NAME, ServerConfig, Settings,
        stream::{Event, EventKind},
    },
    error::ManagerError,
    events::Bus,
    instance::{InstanceHandle, InstanceStatus, ServerInfo},
    properties,
    resolver::Resolver,
    utils,
};

use super::store::Store;

/// Registry of every managed server, keyed by ID.
///
/// The map lock is only held for lookups and structural changes, never
/// across directory setup, downloads or persistence.
pub struct Manager {
    settings: Arc<Settings>,
    bus: Bus,
    store: Arc<dyn Store>,
    resolver: Arc<dyn Resolver>,
    items: RwLock<HashMap<String, InstanceHandle>>,
    /// Serializes snapshot + save so an older snapshot never lands last.
    persist_lock: Mutex<()>,
}

impl Manager {
    /// Creates the root directory and registers every persisted configuration
    /// in the `Stopped` state. A store that fails to load counts as empty.
    pub async fn new(
        settings: Settings,
        bus: Bus,
        store: Arc<dyn Store>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, ManagerError> {
        fs::create_dir_all(&settings.root)
            .await
            .map_err(|e| ManagerError::DirectoryError(format!("{}: {e}", settings.root.display())))?;

        let settings = Arc::new(settings);
        let configs = match store.load_all().await {
            Ok(configs) => configs,
            Err(err) => {
                warn!(%err, "failed to load persisted servers, starting empty");
                Vec::new()
            }
        };

        let items = configs
            .into_iter()
            .map(|config| {
                let id = config.id.clone();
                (id, InstanceHandle::new(config, settings.clone(), bus.clone()))
            })
            .collect::<HashMap<_, _>>();

        info!(root = %settings.root.display(), loaded = items.len(), "manager initialised");

        Ok(Self {
            settings,
            bus,
            store,
            resolver,
            items: RwLock::new(items),
            persist_lock: Mutex::new(()),
        })
    }

    /// A manager persisting to `<root>/servers.json` and downloading jars
    /// from the public metadata APIs.
    #[cfg(feature = "resolver")]
    pub async fn with_defaults(settings: Settings, bus: Bus) -> Result<Self, ManagerError> {
        let store = Arc::new(super::JsonStore::new(&settings.root));
        let resolver = Arc::new(crate::resolver::HttpResolver::new()?);
        Self::new(settings, bus, store, resolver).await
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn get(&self, id: &str) -> Option<InstanceHandle> {
        self.items.read().await.get(id).cloned()
    }

    /// Info of every server, ordered by name (then ID for equal names).
    pub async fn list(&self) -> Vec<ServerInfo> {
        let handles: Vec<InstanceHandle> = self.items.read().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(handles.len());
        for handle in &handles {
            infos.push(handle.info().await);
        }
        infos.sort_by(|a, b| {
            a.config
                .name
                .cmp(&b.config.name)
                .then_with(|| a.config.id.cmp(&b.config.id))
        });
        infos
    }

    /// Fills defaults, prepares the server directory and jar, then registers
    /// the server as `Stopped`. Nothing is registered when a step fails.
    pub async fn create(&self, mut config: ServerConfig) -> Result<InstanceHandle, ManagerError> {
        self.fill_defaults(&mut config)?;

        if self.items.read().await.contains_key(&config.id) {
            return Err(ManagerError::AlreadyExists(config.id));
        }

        fs::create_dir_all(&config.path)
            .await
            .map_err(|e| dir_error(&config, e))?;

        if config.eula {
            fs::write(config.path.join(EULA_NAME), "#Generated by mcs-manager\neula=true\n")
                .await
                .map_err(|e| dir_error(&config, e))?;
        }

        let updates = BTreeMap::from([("server-port".to_string(), config.port.to_string())]);
        properties::save(&config.properties_path(), &updates)
            .await
            .map_err(|e| dir_error(&config, e))?;

        self.resolver
            .ensure_artifact(&config, &config.jar_path())
            .await?;

        let handle = InstanceHandle::new(config.clone(), self.settings.clone(), self.bus.clone());
        {
            let mut items = self.items.write().await;
            if items.contains_key(&config.id) {
                return Err(ManagerError::AlreadyExists(config.id));
            }
            items.insert(config.id.clone(), handle.clone());
        }

        self.bus.publish(Event::created(&config));
        self.persist().await;

        info!(
            id = %config.id,
            name = %config.name,
            port = config.port,
            path = %config.path.display(),
            "server created"
        );
        Ok(handle)
    }

    /// Unregisters a server and removes its directory. Refused while the
    /// server is starting or running.
    pub async fn delete(&self, id: &str) -> Result<(), ManagerError> {
        let handle = {
            let mut items = self.items.write().await;
            let handle = items
                .get(id)
                .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
            if matches!(
                handle.status(),
                InstanceStatus::Running | InstanceStatus::Starting
            ) {
                return Err(ManagerError::Running(id.to_string()));
            }
            items.remove(id)
        };

        if let Some(handle) = handle {
            let path = &handle.config().path;
            match fs::remove_dir_all(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(id, path = %path.display(), %err, "failed to remove server directory"),
            }
        }

        self.persist().await;
        self.bus.publish(Event::new(EventKind::Deleted, id));
        info!(id, "server deleted");
        Ok(())
    }

    fn fill_defaults(&self, config: &mut ServerConfig) -> Result<(), ManagerError> {
        if config.id.trim().is_empty() {
            config.id = utils::random_id();
        }
        if config.name.trim().is_empty() {
            config.name = config.id.clone();
        }
        if config.path.as_os_str().is_empty() {
            config.path = self.settings.root.join(&config.id);
        }
        if config.memory_mb == 0 {
            config.memory_mb = DEFAULT_MEMORY_MB;
        }
        if config.version.trim().is_empty() {
            config.version = DEFAULT_VERSION.to_string();
        }
        if config.port == 0 {
            config.port = utils::pick_free_port().map_err(|e| ManagerError::PortError(e.to_string()))?;
            debug!(id = %config.id, port = config.port, "assigned port");
        }
        Ok(())
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let mut configs: Vec<ServerConfig> = self
            .items
            .read()
            .await
            .values()
            .map(|handle| handle.config().clone())
            .collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));

        if let Err(err) = self.store.save_all(&configs).await {
            warn!(%err, "failed to persist servers");
        }
    }
}

fn dir_error(config: &ServerConfig, err: io::Error) -> ManagerError {
    ManagerError::DirectoryError(format!("{}: {err}", config.path.display()))
}
