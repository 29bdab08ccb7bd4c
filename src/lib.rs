//! Supervision of a fleet of Minecraft server processes.
//!
//! [`Manager`] owns the registry of configured servers, each driven by an
//! [`InstanceHandle`]. Lifecycle and log events of every server are fanned
//! out through the [`Bus`]; live player counts come from the status
//! protocol client in [`query`].

pub mod config;
pub mod error;
pub mod events;
pub mod instance;
#[cfg(feature = "resolver")]
pub mod manifests;
pub mod parser;
pub mod properties;
pub mod query;
pub mod resolver;
pub mod server;
pub mod utils;

pub use config::{
    MinecraftType, ServerConfig, Settings,
    stream::{Event, EventKind, EventPayload, StreamLine, StreamSource},
};
pub use error::{ManagerError, QueryError, ResolveError, ServerError, StoreError};
pub use events::{Bus, Subscription};
pub use instance::{InstanceHandle, InstanceStatus, PlayerInfo, ServerInfo};
#[cfg(feature = "resolver")]
pub use resolver::HttpResolver;
pub use resolver::Resolver;
pub use server::{JsonStore, Manager, Store};
