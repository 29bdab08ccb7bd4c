mod manager;
mod store;

pub use manager::Manager;
pub use store::{JsonStore, Store};
